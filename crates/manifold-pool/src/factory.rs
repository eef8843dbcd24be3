// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Factory trait the pool uses to create, validate, and destroy connections.

use async_trait::async_trait;
use manifold_core::ManifoldError;

/// Produces and tears down connections for one [`Pool`](crate::Pool).
///
/// The pool never constructs connections itself; sizing and recycling live in
/// the pool, while everything protocol-specific lives behind this trait.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Creates a fresh connection. Failures propagate to the acquirer that
    /// triggered the creation.
    async fn create(&self) -> Result<Self::Connection, ManifoldError>;

    /// Tears down a connection. Errors are logged by the pool, never
    /// propagated.
    async fn destroy(&self, conn: Self::Connection) -> Result<(), ManifoldError>;

    /// Checks whether an idle connection is still usable. The default accepts
    /// everything; factories with a cheap liveness probe should override it.
    async fn validate(&self, conn: &mut Self::Connection) -> bool {
        let _ = conn;
        true
    }
}
