// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task classification and backend routing for the Manifold orchestrator.
//!
//! This crate provides:
//! - [`TaskClassifier`]: heuristic task type and complexity detection
//!   (zero-cost, zero-latency)
//! - [`capabilities_of`]: the static per-backend capability/cost table
//! - [`HealthTracker`]: TTL-cached advisory health flags
//! - [`PolicyEngine`]: strategy-driven backend and model selection with
//!   fallback chains for the failover loop
//!
//! The engine sits in front of every LLM call, turning a classified request
//! plus live health data into a [`RoutingDecision`] naming the backend and
//! model to dispatch to.

pub mod capability;
pub mod classifier;
pub mod health;
pub mod policy;

pub use capability::{BackendCapability, capabilities_of};
pub use classifier::{TaskClassifier, TaskComplexity, TaskProfile, TaskType};
pub use health::{HealthTracker, ProviderHealth};
pub use policy::{
    PolicyEngine, RoutingDecision, RoutingOptions, TaskRequirements, model_for,
};
