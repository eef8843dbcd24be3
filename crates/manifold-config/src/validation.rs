// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as pool sizing relationships, threshold ranges, and
//! cross-section consistency.

use manifold_core::types::BackendKind;

use crate::diagnostic::ConfigError;
use crate::model::ManifoldConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ManifoldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.agent.log_level
            ),
        });
    }

    if config.pool.max_connections == 0 {
        errors.push(ConfigError::Validation {
            message: "pool.max_connections must be at least 1".to_string(),
        });
    }

    if config.pool.min_connections > config.pool.max_connections {
        errors.push(ConfigError::Validation {
            message: format!(
                "pool.min_connections ({}) must not exceed pool.max_connections ({})",
                config.pool.min_connections, config.pool.max_connections
            ),
        });
    }

    if config.retry.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if config.retry.failover_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "retry.failover_attempts must be at least 1".to_string(),
        });
    }

    if config.retry.backoff_cap_secs < config.retry.backoff_base_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "retry.backoff_cap_secs ({}) must not be below retry.backoff_base_secs ({})",
                config.retry.backoff_cap_secs, config.retry.backoff_base_secs
            ),
        });
    }

    if !(0.0..=1.0).contains(&config.memory.entity_confidence_threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.entity_confidence_threshold must be within 0.0-1.0, got {}",
                config.memory.entity_confidence_threshold
            ),
        });
    }

    if config.memory.max_messages == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.max_messages must be at least 1".to_string(),
        });
    }

    if config.rag.chunk_size == 0 {
        errors.push(ConfigError::Validation {
            message: "rag.chunk_size must be at least 1".to_string(),
        });
    }

    if config.rag.chunk_overlap >= config.rag.chunk_size {
        errors.push(ConfigError::Validation {
            message: format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                config.rag.chunk_overlap, config.rag.chunk_size
            ),
        });
    }

    if !(0.0..=1.0).contains(&config.rag.min_score) {
        errors.push(ConfigError::Validation {
            message: format!(
                "rag.min_score must be within 0.0-1.0, got {}",
                config.rag.min_score
            ),
        });
    }

    if config.rag.top_k == 0 {
        errors.push(ConfigError::Validation {
            message: "rag.top_k must be at least 1".to_string(),
        });
    }

    if let Some(preferred) = config.routing.prefer
        && !config.backends.entry(preferred).enabled
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "routing.prefer is `{preferred}` but backends.{preferred}.enabled is false"
            ),
        });
    }

    if config.routing.offline && !config.backends.entry(BackendKind::Ollama).enabled {
        errors.push(ConfigError::Validation {
            message: "routing.offline requires backends.ollama.enabled = true".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
