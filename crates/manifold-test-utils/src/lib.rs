// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities shared across the Manifold workspace.
//!
//! Provides deterministic stand-ins for the two external surfaces the
//! orchestrator talks to: [`MockBackend`] (scripted LLM replies behind the
//! `Backend` trait, plus a pool-compatible factory) and [`MockEmbedder`]
//! (hash-derived embedding vectors). Both run entirely in-process.

pub mod mock_backend;
pub mod mock_embedder;

pub use mock_backend::{MockBackend, MockBackendFactory};
pub use mock_embedder::MockEmbedder;
