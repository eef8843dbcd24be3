// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./manifold.toml` > `~/.config/manifold/manifold.toml`
//! > `/etc/manifold/manifold.toml` with environment variable overrides via the
//! `MANIFOLD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ManifoldConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/manifold/manifold.toml` (system-wide)
/// 3. `~/.config/manifold/manifold.toml` (user XDG config)
/// 4. `./manifold.toml` (local directory)
/// 5. `MANIFOLD_*` environment variables
pub fn load_config() -> Result<ManifoldConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ManifoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ManifoldConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ManifoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ManifoldConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ManifoldConfig::default()))
        .merge(Toml::file("/etc/manifold/manifold.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("manifold/manifold.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("manifold.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores themselves: `MANIFOLD_POOL_MAX_CONNECTIONS` must map to
/// `pool.max_connections`, not `pool.max.connections`. The nested
/// `backends.<kind>` tables are mapped first so the section rules cannot
/// split them.
fn env_provider() -> Env {
    Env::prefixed("MANIFOLD_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: MANIFOLD_BACKENDS_OLLAMA_BASE_URL -> "backends_ollama_base_url"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("backends_anthropic_", "backends.anthropic.", 1)
            .replacen("backends_openai_", "backends.openai.", 1)
            .replacen("backends_gemini_", "backends.gemini.", 1)
            .replacen("backends_ollama_", "backends.ollama.", 1)
            .replacen("agent_", "agent.", 1)
            .replacen("routing_", "routing.", 1)
            .replacen("pool_", "pool.", 1)
            .replacen("retry_", "retry.", 1)
            .replacen("memory_", "memory.", 1)
            .replacen("rag_", "rag.", 1);
        mapped.into()
    })
}
