// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic bounded connection pool for Manifold backends.
//!
//! The pool is generic over a [`ConnectionFactory`], which knows how to
//! create, validate, and destroy one kind of connection. On top of that the
//! [`Pool`] adds bounded capacity with FIFO waiting, idle reuse, periodic
//! revalidation, idle reaping, and age-based retirement.
//!
//! ```no_run
//! use manifold_pool::{Pool, PoolOptions};
//! # use manifold_core::ManifoldError;
//! # struct HttpFactory;
//! # #[async_trait::async_trait]
//! # impl manifold_pool::ConnectionFactory for HttpFactory {
//! #     type Connection = ();
//! #     async fn create(&self) -> Result<(), ManifoldError> { Ok(()) }
//! #     async fn destroy(&self, _conn: ()) -> Result<(), ManifoldError> { Ok(()) }
//! # }
//!
//! # async fn demo() -> Result<(), ManifoldError> {
//! let pool = Pool::new(HttpFactory, PoolOptions::default());
//! let conn = pool.acquire().await?;
//! // use *conn ...
//! drop(conn); // returns it to the idle list
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod pool;

pub use factory::ConnectionFactory;
pub use pool::{Pool, PoolOptions, PoolStats, PooledConnection};
