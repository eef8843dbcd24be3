// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration for Manifold.
//!
//! This crate composes every subsystem into one front door:
//!
//! - [`Orchestrator`]: per-backend connection pools, policy-driven routing,
//!   retry and failover, tiered memory, and optional RAG context injection
//! - [`TaskSpec`] / [`Orchestrator::run_batch`]: concurrent multi-task
//!   execution with pool-bounded parallelism
//!
//! A chat turn flows classify -> route -> remember -> augment -> dispatch;
//! transient failures consume the retry budget on the chosen backend, then
//! fail over down the policy engine's candidate list.

pub mod batch;
pub mod orchestrator;

pub use batch::TaskSpec;
pub use orchestrator::{BackendConnector, ChatMetrics, ChatOutcome, Orchestrator};
