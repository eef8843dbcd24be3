// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tiered conversation memory for the Manifold orchestrator.
//!
//! Three tiers with different lifetimes and eviction rules, fronted by
//! one manager whose `search` fans out across all of them and merges
//! the hits into a single source-banded ranking.
//!
//! ## Architecture
//!
//! - **ShortTermMemory**: rolling transcript, capped and TTL-swept,
//!   system prompt pinned
//! - **WorkingMemory**: keyed context values with importance-times-use
//!   eviction scoring
//! - **LongTermMemory**: facts, entities, and episodes over a
//!   pluggable [`LongTermStore`]
//! - **InMemoryStore**: reference store, HashMaps behind a tokio
//!   `RwLock`
//! - **MemoryManager**: the front door the orchestrator talks to

pub mod long_term;
pub mod manager;
pub mod short_term;
pub mod store;
pub mod types;
pub mod working;

pub use long_term::{LongTermMemory, LongTermOptions};
pub use manager::{MemoryManager, MemoryOptions, MemoryStats};
pub use short_term::{ConversationSnapshot, ShortTermMemory, ShortTermOptions};
pub use store::{FactHit, InMemoryStore, LongTermStats, LongTermStore};
pub use types::*;
pub use working::{ContextMeta, WorkingMemory, WorkingOptions};
