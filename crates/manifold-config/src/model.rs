// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Manifold orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use manifold_core::types::BackendKind;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Top-level Manifold configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManifoldConfig {
    /// Identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Per-backend credentials and endpoints.
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Routing strategy and constraints.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Connection pool sizing and lifecycle.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Retry and failover budgets.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Memory tier sizing and TTLs.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Retrieval pipeline settings.
    #[serde(default)]
    pub rag: RagConfig,
}

impl ManifoldConfig {
    /// Backends enabled in this configuration, in declaration order.
    pub fn configured_backends(&self) -> Vec<BackendKind> {
        self.backends
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(kind, _)| kind)
            .collect()
    }
}

/// Identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// System prompt prepended to every conversation. `None` sends no
    /// system message.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
        }
    }
}

fn default_agent_name() -> String {
    "manifold".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Credentials and endpoint for a single backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendEntry {
    /// Whether this backend participates in routing.
    #[serde(default)]
    pub enabled: bool,

    /// API key. `None` is valid for local backends.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the backend's base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Per-backend configuration, one entry per supported backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendsConfig {
    #[serde(default)]
    pub anthropic: BackendEntry,

    #[serde(default)]
    pub openai: BackendEntry,

    #[serde(default)]
    pub gemini: BackendEntry,

    #[serde(default)]
    pub ollama: BackendEntry,
}

impl BackendsConfig {
    /// Iterates entries in a fixed order matching [`BackendKind`].
    pub fn iter(&self) -> impl Iterator<Item = (BackendKind, &BackendEntry)> {
        [
            (BackendKind::Anthropic, &self.anthropic),
            (BackendKind::OpenAi, &self.openai),
            (BackendKind::Gemini, &self.gemini),
            (BackendKind::Ollama, &self.ollama),
        ]
        .into_iter()
    }

    /// Returns the entry for a backend kind.
    pub fn entry(&self, kind: BackendKind) -> &BackendEntry {
        match kind {
            BackendKind::Anthropic => &self.anthropic,
            BackendKind::OpenAi => &self.openai,
            BackendKind::Gemini => &self.gemini,
            BackendKind::Ollama => &self.ollama,
        }
    }
}

/// Backend selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RoutingStrategy {
    /// Cheapest eligible backend by average per-MTok cost.
    CostOptimized,
    /// Fastest eligible backend by average latency.
    LatencyOptimized,
    /// Complexity-tiered rungs: cheap for simple work, capable for hard work.
    Cascading,
    /// Task-type lookup table.
    Predictive,
    /// Local backend whenever it is configured and healthy.
    LocalFirst,
}

/// Routing strategy and constraints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Selection strategy applied to eligible backends.
    #[serde(default = "default_strategy")]
    pub strategy: RoutingStrategy,

    /// Restrict all routing to local backends.
    #[serde(default)]
    pub offline: bool,

    /// Try further candidates after retries on the chosen backend fail.
    #[serde(default = "default_failover_enabled")]
    pub failover_enabled: bool,

    /// Backend to prefer before strategy selection runs, when healthy.
    #[serde(default)]
    pub prefer: Option<BackendKind>,

    /// Hard ceiling on average backend latency in milliseconds.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,

    /// Hard ceiling on average backend cost in USD per million tokens.
    #[serde(default)]
    pub max_cost_per_mtok: Option<f64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            offline: false,
            failover_enabled: default_failover_enabled(),
            prefer: None,
            max_latency_ms: None,
            max_cost_per_mtok: None,
        }
    }
}

fn default_strategy() -> RoutingStrategy {
    RoutingStrategy::CostOptimized
}

fn default_failover_enabled() -> bool {
    true
}

/// Connection pool sizing and lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Connections the reaper never prunes below.
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    /// Hard cap on live connections per backend.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seconds an acquire waits before failing.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Seconds of idleness before a connection is reaped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds after creation before a connection is retired on release.
    #[serde(default = "default_max_connection_age_secs")]
    pub max_connection_age_secs: u64,

    /// Seconds between validation sweeps over idle connections.
    #[serde(default = "default_validate_interval_secs")]
    pub validate_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_connection_age_secs: default_max_connection_age_secs(),
            validate_interval_secs: default_validate_interval_secs(),
        }
    }
}

fn default_min_connections() -> usize {
    2
}

fn default_max_connections() -> usize {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_max_connection_age_secs() -> u64 {
    3600 // 1 hour
}

fn default_validate_interval_secs() -> u64 {
    60
}

/// Retry and failover budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts against the first-choice backend.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempts against each failover candidate.
    #[serde(default = "default_failover_attempts")]
    pub failover_attempts: u32,

    /// Seconds each individual backend call may run.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Base of the exponential backoff between attempts, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Ceiling on any single backoff sleep, in seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            failover_attempts: default_failover_attempts(),
            call_timeout_secs: default_call_timeout_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_failover_attempts() -> u32 {
    2
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_backoff_cap_secs() -> u64 {
    30
}

/// Memory tier sizing and TTL configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Rolling window size of the short-term conversation tier.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Seconds before a short-term message expires.
    #[serde(default = "default_short_term_ttl_secs")]
    pub short_term_ttl_secs: u64,

    /// Capacity of the working (scratchpad) tier.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Seconds before a working entry expires.
    #[serde(default = "default_working_ttl_secs")]
    pub working_ttl_secs: u64,

    /// Minimum entity confidence for inclusion in search results (0.0-1.0).
    #[serde(default = "default_entity_confidence_threshold")]
    pub entity_confidence_threshold: f64,

    /// Episode capacity; the oldest episode is evicted beyond this.
    #[serde(default = "default_max_episodes")]
    pub max_episodes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            short_term_ttl_secs: default_short_term_ttl_secs(),
            max_entries: default_max_entries(),
            working_ttl_secs: default_working_ttl_secs(),
            entity_confidence_threshold: default_entity_confidence_threshold(),
            max_episodes: default_max_episodes(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

fn default_short_term_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_max_entries() -> usize {
    50
}

fn default_working_ttl_secs() -> u64 {
    7200 // 2 hours
}

fn default_entity_confidence_threshold() -> f64 {
    0.7
}

fn default_max_episodes() -> usize {
    100
}

/// Placement of retrieved context within the outgoing transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContextInjection {
    /// Dedicated system message after any leading system prompt.
    System,
    /// User message inserted before the last user message.
    User,
    /// Prepended to the last user message's content.
    Inline,
}

/// Retrieval pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RagConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of the previous chunk carried into the next.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of nearest neighbours retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a retrieved chunk (0.0-1.0).
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Character budget for formatted context.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Capacity of the embedding cache; the oldest entry is evicted beyond
    /// this.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Where retrieved context is placed in the transcript.
    #[serde(default = "default_injection")]
    pub injection: ContextInjection,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_context_length: default_max_context_length(),
            cache_max_entries: default_cache_max_entries(),
            injection: default_injection(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.7
}

fn default_max_context_length() -> usize {
    2000
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_injection() -> ContextInjection {
    ContextInjection::System
}
