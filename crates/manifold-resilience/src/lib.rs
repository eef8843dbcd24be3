// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry execution for Manifold backend calls.
//!
//! One call site wraps every LLM dispatch: [`execute`] acquires a pooled
//! connection, races each attempt against a timeout, and backs off
//! exponentially between transient failures. Failover across backends is
//! the orchestrator's job; this crate only ever talks to one backend per
//! invocation.

pub mod retry;

pub use retry::{GenerateRequest, RetryCallback, RetryPolicy, execute};
