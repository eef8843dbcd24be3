// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `manifold status` command implementation.
//!
//! Shows the effective configuration and the routing table the orchestrator
//! would work from: which backends are enabled, their capability and cost
//! profile, and the default chat model each would serve. `--json` emits the
//! same report structured for scripting.

use colored::Colorize;
use manifold_config::ManifoldConfig;
use manifold_core::ManifoldError;
use manifold_router::{TaskType, capabilities_of, model_for};
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub agent: String,
    pub log_level: String,
    pub strategy: String,
    pub offline: bool,
    pub failover_enabled: bool,
    pub prefer: Option<String>,
    pub pool_max_connections: usize,
    pub retry_max_attempts: u32,
    pub rag_top_k: usize,
    pub backends: Vec<BackendStatus>,
}

/// One row of the backend capability table.
#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub kind: String,
    pub enabled: bool,
    pub local: bool,
    pub avg_latency_ms: u64,
    pub avg_cost_per_mtok: f64,
    pub supports_tool_calls: bool,
    pub supports_vision: bool,
    pub default_model: String,
}

/// Runs the `manifold status` command.
pub fn run_status(config: &ManifoldConfig, json: bool) -> Result<(), ManifoldError> {
    let report = build_report(config);

    if json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|error| {
            ManifoldError::Serialization {
                message: "status report could not be serialized".to_string(),
                source: Some(Box::new(error)),
            }
        })?;
        println!("{rendered}");
        return Ok(());
    }

    println!("{}", "manifold status".bold());
    println!("  agent: {} (log {})", report.agent, report.log_level);
    println!(
        "  routing: {}, failover {}{}{}",
        report.strategy,
        if report.failover_enabled { "on" } else { "off" },
        if report.offline { ", offline" } else { "" },
        report
            .prefer
            .as_ref()
            .map(|p| format!(", prefer {p}"))
            .unwrap_or_default()
    );
    println!(
        "  pool: {} connections max; retry: {} attempts; rag: top-{}",
        report.pool_max_connections, report.retry_max_attempts, report.rag_top_k
    );
    println!("  backends:");
    for backend in &report.backends {
        let state = if backend.enabled {
            "enabled ".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "    {:<10} {state}  {}  {:>5}ms  ${:.2}/MTok  {}",
            backend.kind,
            if backend.local { "local" } else { "cloud" },
            backend.avg_latency_ms,
            backend.avg_cost_per_mtok,
            backend.default_model
        );
    }
    Ok(())
}

fn build_report(config: &ManifoldConfig) -> StatusReport {
    let backends = config
        .backends
        .iter()
        .map(|(kind, entry)| {
            let capability = capabilities_of(kind);
            BackendStatus {
                kind: kind.to_string(),
                enabled: entry.enabled,
                local: capability.is_local,
                avg_latency_ms: capability.avg_latency_ms,
                avg_cost_per_mtok: capability.avg_cost_per_mtok,
                supports_tool_calls: capability.supports_tool_calls,
                supports_vision: capability.supports_vision,
                default_model: model_for(kind, TaskType::General).to_string(),
            }
        })
        .collect();

    StatusReport {
        agent: config.agent.name.clone(),
        log_level: config.agent.log_level.clone(),
        strategy: config.routing.strategy.to_string(),
        offline: config.routing.offline,
        failover_enabled: config.routing.failover_enabled,
        prefer: config.routing.prefer.map(|kind| kind.to_string()),
        pool_max_connections: config.pool.max_connections,
        retry_max_attempts: config.retry.max_attempts,
        rag_top_k: config.rag.top_k,
        backends,
    }
}
