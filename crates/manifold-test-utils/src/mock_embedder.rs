// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedder for testing the RAG pipeline without a provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use manifold_core::{Embedder, ManifoldError};
use tokio::sync::Mutex;

/// Embeds text as an L2-normalized byte-bucket histogram.
///
/// Identical inputs produce identical vectors (cosine similarity 1.0),
/// similar inputs land near each other, and no network is involved. Every
/// text that reaches the provider is recorded, so cache tests can assert
/// exactly which lookups missed.
pub struct MockEmbedder {
    dimension: usize,
    calls: Arc<AtomicUsize>,
    embedded: Arc<Mutex<Vec<String>>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(8)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Arc::new(AtomicUsize::new(0)),
            embedded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of `embed` calls that reached this provider.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text embedded so far, in order.
    pub async fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().await.clone()
    }

    /// The vector this embedder would produce for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dimension] += f32::from(b) / 255.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "byte-histogram"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ManifoldError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.embedded.lock().await.extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
