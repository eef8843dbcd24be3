// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedder trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::ManifoldError;

/// Converts text into vector representations for semantic search.
///
/// `provider()` and `model()` identify the embedding space and form part of
/// the cache key: vectors from different (provider, model) pairs are never
/// interchangeable.
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Provider identifier, e.g. `"openai"` or `"ollama"`.
    fn provider(&self) -> &str;

    /// Model identifier within the provider, e.g. `"text-embedding-3-small"`.
    fn model(&self) -> &str;

    /// Embeds a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ManifoldError>;
}
