// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend adapter trait for LLM integrations (Anthropic, OpenAI, Gemini, Ollama).

use async_trait::async_trait;

use crate::error::ManifoldError;
use crate::types::{BackendKind, ChatMessage, GenerateOptions, GenerateResponse};

/// An opaque client for one LLM backend.
///
/// The orchestrator never constructs concrete clients itself; it receives
/// factories producing `Box<dyn Backend>` at startup and talks to them only
/// through this trait. One instance corresponds to one logical connection
/// and is what the resource pool creates, validates, and recycles.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Which backend this client talks to.
    fn kind(&self) -> BackendKind;

    /// Sends a chat transcript and returns the completed generation.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerateOptions,
    ) -> Result<GenerateResponse, ManifoldError>;

    /// Lightweight liveness check, also used by the pool validator.
    async fn ping(&self) -> Result<(), ManifoldError>;

    /// Releases any held resources. Errors are logged by callers, never
    /// propagated (cleanup is best-effort).
    async fn close(&self) -> Result<(), ManifoldError>;
}

/// Boxed backends delegate, so `Box<dyn Backend>` can flow through code
/// generic over `B: Backend` (the pool's connection type in particular).
#[async_trait]
impl<T: Backend + ?Sized> Backend for Box<T> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &GenerateOptions,
    ) -> Result<GenerateResponse, ManifoldError> {
        (**self).generate(messages, model, options).await
    }

    async fn ping(&self) -> Result<(), ManifoldError> {
        (**self).ping().await
    }

    async fn close(&self) -> Result<(), ManifoldError> {
        (**self).close().await
    }
}

/// Builds fresh [`Backend`] clients for one backend kind.
///
/// Registered with the orchestrator at startup; the pool calls it lazily
/// whenever it needs a new connection.
#[async_trait]
pub trait BackendFactory: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    async fn build(&self) -> Result<Box<dyn Backend>, ManifoldError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Ollama
        }

        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _options: &GenerateOptions,
        ) -> Result<GenerateResponse, ManifoldError> {
            Err(ManifoldError::Internal("null backend".into()))
        }

        async fn ping(&self) -> Result<(), ManifoldError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ManifoldError> {
            Ok(())
        }
    }

    #[test]
    fn backend_is_object_safe() {
        fn assert_dyn(_: &dyn Backend) {}
        assert_dyn(&NullBackend);
    }

    #[tokio::test]
    async fn null_backend_pings() {
        let backend: Box<dyn Backend> = Box::new(NullBackend);
        assert!(backend.ping().await.is_ok());
        assert_eq!(backend.kind(), BackendKind::Ollama);
    }
}
