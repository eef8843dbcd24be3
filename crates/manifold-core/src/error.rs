// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Manifold orchestrator.

use thiserror::Error;

use crate::types::BackendKind;

/// The primary error type used across all Manifold crates.
#[derive(Debug, Error)]
pub enum ManifoldError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// No configured backend satisfies the request's requirements.
    #[error("no eligible backend: {reason}")]
    NoEligibleBackend { reason: String },

    /// A backend call failed (API error, refused request, malformed reply).
    #[error("backend {backend} error: {message}")]
    Backend {
        backend: BackendKind,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single backend call exceeded its per-attempt timeout.
    #[error("backend call timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Every candidate backend was tried and failed.
    #[error("all backends exhausted after trying {attempted:?}")]
    FailoverExhausted {
        attempted: Vec<BackendKind>,
        source: Box<ManifoldError>,
    },

    /// Waited longer than the configured acquire timeout for a pooled connection.
    #[error("pool acquire timed out after {duration:?}")]
    PoolTimeout { duration: std::time::Duration },

    /// The pool has been closed; no further acquisitions are possible.
    #[error("pool is closed")]
    PoolClosed,

    /// A vector's dimensionality does not match the index.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted or interchange data could not be parsed.
    #[error("serialization error: {message}")]
    Serialization {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Caller-supplied input violated an operation's preconditions.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ManifoldError {
    /// Whether the retry executor should re-attempt the same backend.
    ///
    /// Only provider-side failures and per-attempt timeouts are transient.
    /// Pool exhaustion is surfaced to the caller instead of being retried
    /// against the same (already saturated) backend.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ManifoldError::Backend { .. } | ManifoldError::Timeout { .. }
        )
    }
}
