// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline stand-ins for the provider seams.
//!
//! The demo binary has no real provider SDKs; these adapters let the full
//! pipeline (routing, pooling, retries, memory, RAG) run locally. A real
//! deployment replaces them with HTTP-backed implementations of the same
//! traits.

use std::time::Instant;

use async_trait::async_trait;
use manifold_core::{
    Backend, BackendFactory, BackendKind, ChatMessage, Embedder, GenerateOptions,
    GenerateResponse, ManifoldError, Role, TokenUsage, approx_token_count,
};

/// Echo backend: replies with a tagged restatement of the last user turn.
pub struct DemoBackend {
    kind: BackendKind,
}

#[async_trait]
impl Backend for DemoBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        _options: &GenerateOptions,
    ) -> Result<GenerateResponse, ManifoldError> {
        let started = Instant::now();
        let prompt_tokens: usize = messages
            .iter()
            .map(|message| approx_token_count(&message.content))
            .sum();
        let last_user = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.trim())
            .unwrap_or_default();

        let content = format!("[demo {}:{model}] you said: {last_user}", self.kind);
        let usage = TokenUsage::new(prompt_tokens as u32, approx_token_count(&content) as u32);
        Ok(GenerateResponse {
            content,
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn ping(&self) -> Result<(), ManifoldError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ManifoldError> {
        Ok(())
    }
}

/// Builds [`DemoBackend`] clients for one backend kind.
pub struct DemoFactory {
    kind: BackendKind,
}

impl DemoFactory {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl BackendFactory for DemoFactory {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn build(&self) -> Result<Box<dyn Backend>, ManifoldError> {
        Ok(Box::new(DemoBackend { kind: self.kind }))
    }
}

/// Deterministic bag-of-words embedder: FNV-hashed words bucketed into a
/// fixed-dimension vector, L2-normalized. Similar wording lands close, which
/// is enough to demo retrieval.
pub struct DemoEmbedder {
    dimension: usize,
}

impl Default for DemoEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoEmbedder {
    pub fn new() -> Self {
        Self { dimension: 64 }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100_0000_01b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for DemoEmbedder {
    fn provider(&self) -> &str {
        "demo"
    }

    fn model(&self) -> &str {
        "fnv-bow-64"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ManifoldError> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_backend_echoes_the_last_user_turn() {
        let backend = DemoFactory::new(BackendKind::Ollama).build().await.unwrap();
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("ping?"),
        ];
        let response = backend
            .generate(&messages, "llama3.1:8b", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "[demo ollama:llama3.1:8b] you said: ping?");
        assert!(response.usage.total_tokens > 0);
    }

    #[tokio::test]
    async fn demo_embedder_is_deterministic_and_normalized() {
        let embedder = DemoEmbedder::new();
        let vectors = embedder
            .embed(&["the deploy password".to_string(), "the deploy password".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vectors[1]);

        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }
}
