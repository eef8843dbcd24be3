// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Manifold plugin seams.
//!
//! Concrete backend SDK clients and embedding engines live outside this
//! workspace; everything here is written against these traits and
//! `#[async_trait]` keeps them dynamically dispatchable.

pub mod backend;
pub mod embedder;

pub use backend::{Backend, BackendFactory};
pub use embedder::Embedder;
