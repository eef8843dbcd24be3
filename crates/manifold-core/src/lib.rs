// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Manifold request orchestrator.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Manifold workspace. Backend and embedder
//! integrations implement traits defined here.

pub mod error;
pub mod token;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ManifoldError;
pub use token::approx_token_count;
pub use traits::{Backend, BackendFactory, Embedder};
pub use types::{
    BackendKind, ChatMessage, GenerateOptions, GenerateResponse, Role, TokenUsage,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = ManifoldError::Config("test".into());
        let _eligible = ManifoldError::NoEligibleBackend {
            reason: "test".into(),
        };
        let _backend = ManifoldError::Backend {
            backend: BackendKind::Anthropic,
            message: "test".into(),
            source: Some(Box::new(std::io::Error::other("test"))),
        };
        let _timeout = ManifoldError::Timeout {
            duration: std::time::Duration::from_secs(60),
        };
        let _exhausted = ManifoldError::FailoverExhausted {
            attempted: vec![BackendKind::Anthropic],
            source: Box::new(ManifoldError::PoolClosed),
        };
        let _pool_timeout = ManifoldError::PoolTimeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _pool_closed = ManifoldError::PoolClosed;
        let _dims = ManifoldError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        let _serialization = ManifoldError::Serialization {
            message: "test".into(),
            source: None,
        };
        let _invalid = ManifoldError::InvalidInput("test".into());
        let _internal = ManifoldError::Internal("test".into());
    }

    #[test]
    fn exports_are_reachable() {
        // Compile-time check that the seam traits stay object safe.
        fn _assert_backend(_: &dyn Backend) {}
        fn _assert_factory(_: &dyn BackendFactory) {}
        fn _assert_embedder(_: &dyn Embedder) {}
        let _ = approx_token_count("hello");
    }
}
