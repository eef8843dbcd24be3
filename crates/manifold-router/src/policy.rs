// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strategy-driven backend and model selection.
//!
//! Selection order: offline forcing > local-first short-circuit > caller
//! preference > hard-requirement filtering > strategy over the survivors.
//! A strategy pick that is unconfigured or unhealthy falls back to the first
//! eligible candidate with the reason annotated.

use manifold_config::model::{RoutingConfig, RoutingStrategy};
use manifold_core::{ManifoldError, types::BackendKind};
use tracing::debug;

use crate::capability::{capabilities_of, cloud_cost_rungs};
use crate::classifier::{TaskComplexity, TaskType};
use crate::health::HealthTracker;

/// Constraints one request places on backend selection.
#[derive(Debug, Clone, Default)]
pub struct TaskRequirements {
    pub task_type: TaskType,
    pub complexity: TaskComplexity,
    pub require_structured_output: bool,
    pub require_tool_calls: bool,
    pub require_vision: bool,
    /// Exclude backends whose average latency exceeds this, in ms.
    pub max_latency_ms: Option<u64>,
    /// Exclude backends whose average cost exceeds this, in USD per MTok.
    pub max_cost_per_mtok: Option<f64>,
    /// Backend to select outright when configured and healthy.
    pub preferred: Option<BackendKind>,
    /// Restrict this request to local backends.
    pub offline_only: bool,
}

/// Engine-level routing settings, normally taken from the config file.
#[derive(Debug, Clone)]
pub struct RoutingOptions {
    pub strategy: RoutingStrategy,
    pub offline: bool,
    pub failover_enabled: bool,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::CostOptimized,
            offline: false,
            failover_enabled: true,
        }
    }
}

impl From<&RoutingConfig> for RoutingOptions {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            strategy: config.strategy,
            offline: config.offline,
            failover_enabled: config.failover_enabled,
        }
    }
}

/// Outcome of backend selection for one request. Immutable once returned;
/// logged, never persisted.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub backend: BackendKind,
    pub model: String,
    pub reason: String,
    pub estimated_cost_per_mtok: f64,
    pub estimated_latency_ms: u64,
    pub complexity: TaskComplexity,
}

/// Task-type-specific model for a backend, with a per-backend general row
/// as the fallback.
pub fn model_for(kind: BackendKind, task_type: TaskType) -> &'static str {
    match (kind, task_type) {
        (BackendKind::Anthropic, TaskType::Chat | TaskType::Summarize) => {
            "claude-haiku-4-5-20250901"
        }
        (BackendKind::Anthropic, TaskType::Analysis) => "claude-opus-4-20250514",
        (BackendKind::Anthropic, _) => "claude-sonnet-4-20250514",
        (BackendKind::OpenAi, TaskType::Chat | TaskType::Summarize) => "gpt-4o-mini",
        (BackendKind::OpenAi, _) => "gpt-4o",
        (BackendKind::Gemini, TaskType::Analysis) => "gemini-2.5-pro",
        (BackendKind::Gemini, _) => "gemini-2.5-flash",
        (BackendKind::Ollama, TaskType::Code) => "qwen2.5-coder:7b",
        (BackendKind::Ollama, _) => "llama3.1:8b",
    }
}

/// Fixed failover order per task type, before filtering to what is
/// actually configured.
fn static_chain(task_type: TaskType) -> &'static [BackendKind] {
    match task_type {
        TaskType::Code => &[
            BackendKind::Ollama,
            BackendKind::OpenAi,
            BackendKind::Anthropic,
            BackendKind::Gemini,
        ],
        TaskType::Analysis => &[
            BackendKind::Anthropic,
            BackendKind::OpenAi,
            BackendKind::Gemini,
            BackendKind::Ollama,
        ],
        TaskType::Extraction => &[
            BackendKind::OpenAi,
            BackendKind::Anthropic,
            BackendKind::Gemini,
            BackendKind::Ollama,
        ],
        TaskType::Summarize | TaskType::Chat | TaskType::General => &[
            BackendKind::Gemini,
            BackendKind::OpenAi,
            BackendKind::Anthropic,
            BackendKind::Ollama,
        ],
    }
}

/// Picks a backend and model for each request under the configured strategy.
pub struct PolicyEngine {
    configured: Vec<BackendKind>,
    options: RoutingOptions,
}

impl PolicyEngine {
    pub fn new(configured: Vec<BackendKind>, options: RoutingOptions) -> Self {
        Self {
            configured,
            options,
        }
    }

    pub fn options(&self) -> &RoutingOptions {
        &self.options
    }

    /// Selects a backend and model for the given requirements.
    pub fn select(
        &self,
        req: &TaskRequirements,
        health: &HealthTracker,
    ) -> Result<RoutingDecision, ManifoldError> {
        // Step 1: offline mode forces the local backend.
        if req.offline_only || self.options.offline {
            return match self.local_backend() {
                Some(kind) => Ok(self.decision(kind, req, "offline mode, local backend".into())),
                None => Err(ManifoldError::Config(
                    "offline mode requires a configured local backend".into(),
                )),
            };
        }

        // Step 2: local-first takes a healthy local backend outright.
        if self.options.strategy == RoutingStrategy::LocalFirst
            && let Some(kind) = self.local_backend().filter(|k| health.is_healthy(*k))
        {
            return Ok(self.decision(kind, req, "local-first strategy".into()));
        }

        // Step 3: caller preference wins when configured and healthy.
        if let Some(preferred) = req.preferred
            && self.configured.contains(&preferred)
            && health.is_healthy(preferred)
        {
            return Ok(self.decision(preferred, req, format!("preferred backend {preferred}")));
        }

        // Step 4: health and hard-requirement filtering.
        let eligible = self.eligible(req, health, &[]);
        if eligible.is_empty() {
            return Err(ManifoldError::NoEligibleBackend {
                reason: "no configured backend is healthy and meets the task requirements".into(),
            });
        }

        // Steps 5-6: strategy over the survivors.
        let (backend, reason) = self.apply_strategy(req, &eligible);
        Ok(self.decision(backend, req, reason))
    }

    /// Next backend for the failover loop, with prior attempts excluded.
    /// `None` once nothing eligible remains.
    pub fn next_candidate(
        &self,
        req: &TaskRequirements,
        exclude: &[BackendKind],
        health: &HealthTracker,
    ) -> Option<RoutingDecision> {
        let eligible = self.eligible(req, health, exclude);
        if eligible.is_empty() {
            return None;
        }
        let (backend, reason) = self.apply_strategy(req, &eligible);
        Some(self.decision(backend, req, format!("failover: {reason}")))
    }

    /// Fixed task-type-keyed failover order filtered to configured backends.
    /// Offline mode restricts the chain to local-capable backends.
    pub fn fallback_chain(&self, req: &TaskRequirements) -> Vec<BackendKind> {
        let offline = req.offline_only || self.options.offline;
        static_chain(req.task_type)
            .iter()
            .copied()
            .filter(|kind| self.configured.contains(kind))
            .filter(|kind| !offline || capabilities_of(*kind).is_local)
            .collect()
    }

    fn local_backend(&self) -> Option<BackendKind> {
        self.configured
            .iter()
            .copied()
            .find(|kind| capabilities_of(*kind).is_local)
    }

    fn eligible(
        &self,
        req: &TaskRequirements,
        health: &HealthTracker,
        exclude: &[BackendKind],
    ) -> Vec<BackendKind> {
        let offline = req.offline_only || self.options.offline;
        self.configured
            .iter()
            .copied()
            .filter(|kind| !exclude.contains(kind))
            .filter(|kind| health.is_healthy(*kind))
            .filter(|kind| {
                let cap = capabilities_of(*kind);
                (!offline || cap.is_local)
                    && (!req.require_structured_output || cap.supports_structured_output)
                    && (!req.require_tool_calls || cap.supports_tool_calls)
                    && (!req.require_vision || cap.supports_vision)
                    && req.max_latency_ms.is_none_or(|max| cap.avg_latency_ms <= max)
                    && req
                        .max_cost_per_mtok
                        .is_none_or(|max| cap.avg_cost_per_mtok <= max)
            })
            .collect()
    }

    /// Applies the active strategy. `eligible` must be non-empty.
    fn apply_strategy(
        &self,
        req: &TaskRequirements,
        eligible: &[BackendKind],
    ) -> (BackendKind, String) {
        let strategy = self.options.strategy;
        let intended = match strategy {
            RoutingStrategy::CostOptimized => cheapest(eligible).unwrap_or(eligible[0]),
            RoutingStrategy::LatencyOptimized => fastest(eligible).unwrap_or(eligible[0]),
            RoutingStrategy::Cascading => cascade_rung(req.complexity),
            RoutingStrategy::Predictive => predictive_pick(req),
            // A healthy local backend was taken in step 2; past that point
            // local-first degrades to the cheapest eligible candidate.
            RoutingStrategy::LocalFirst => cheapest(eligible).unwrap_or(eligible[0]),
        };

        if eligible.contains(&intended) {
            (intended, format!("{strategy} strategy"))
        } else {
            let backend = eligible[0];
            debug!(
                intended = %intended,
                actual = %backend,
                "strategy pick not eligible, using first candidate"
            );
            (
                backend,
                format!("{strategy} strategy picked {intended}, not eligible; using {backend}"),
            )
        }
    }

    fn decision(
        &self,
        backend: BackendKind,
        req: &TaskRequirements,
        reason: String,
    ) -> RoutingDecision {
        let cap = capabilities_of(backend);
        let model = model_for(backend, req.task_type);
        debug!(
            backend = %backend,
            model,
            complexity = %req.complexity,
            reason = %reason,
            "routing decision"
        );
        RoutingDecision {
            backend,
            model: model.to_string(),
            reason,
            estimated_cost_per_mtok: cap.avg_cost_per_mtok,
            estimated_latency_ms: cap.avg_latency_ms,
            complexity: req.complexity,
        }
    }
}

fn cheapest(candidates: &[BackendKind]) -> Option<BackendKind> {
    candidates.iter().copied().min_by(|a, b| {
        capabilities_of(*a)
            .avg_cost_per_mtok
            .total_cmp(&capabilities_of(*b).avg_cost_per_mtok)
    })
}

fn fastest(candidates: &[BackendKind]) -> Option<BackendKind> {
    candidates
        .iter()
        .copied()
        .min_by_key(|kind| capabilities_of(*kind).avg_latency_ms)
}

/// Escalation rung for the cascading strategy, read off the cloud cost
/// ladder: cheapest for routine work, mid for complex, top for strategic.
/// The static table always carries at least one cloud backend.
fn cascade_rung(complexity: TaskComplexity) -> BackendKind {
    let rungs = cloud_cost_rungs();
    let idx = match complexity {
        TaskComplexity::Simple | TaskComplexity::Moderate => 0,
        TaskComplexity::Complex => rungs.len() / 2,
        TaskComplexity::Strategic => rungs.len() - 1,
    };
    rungs[idx]
}

/// Task-type lookup for the predictive strategy.
fn predictive_pick(req: &TaskRequirements) -> BackendKind {
    // Schema-constrained output combined with tool calls is strongest on
    // OpenAI; that need outranks the per-type preference.
    if req.require_structured_output && req.require_tool_calls {
        return BackendKind::OpenAi;
    }
    match req.task_type {
        TaskType::Code => BackendKind::Ollama,
        TaskType::Extraction => BackendKind::OpenAi,
        TaskType::Analysis => BackendKind::Anthropic,
        TaskType::Summarize | TaskType::Chat | TaskType::General => BackendKind::Gemini,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(configured: &[BackendKind], strategy: RoutingStrategy) -> PolicyEngine {
        PolicyEngine::new(
            configured.to_vec(),
            RoutingOptions {
                strategy,
                ..RoutingOptions::default()
            },
        )
    }

    fn all_clouds() -> Vec<BackendKind> {
        vec![BackendKind::Anthropic, BackendKind::OpenAi, BackendKind::Gemini]
    }

    #[test]
    fn cost_optimized_picks_cheapest() {
        let engine = engine(&all_clouds(), RoutingStrategy::CostOptimized);
        let decision = engine
            .select(&TaskRequirements::default(), &HealthTracker::new())
            .unwrap();
        assert_eq!(decision.backend, BackendKind::Gemini);
        assert_eq!(decision.reason, "cost-optimized strategy");
    }

    #[test]
    fn latency_optimized_picks_fastest() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::OpenAi],
            RoutingStrategy::LatencyOptimized,
        );
        let decision = engine
            .select(&TaskRequirements::default(), &HealthTracker::new())
            .unwrap();
        assert_eq!(decision.backend, BackendKind::OpenAi);
    }

    #[test]
    fn unhealthy_backend_is_excluded() {
        let engine = engine(&all_clouds(), RoutingStrategy::CostOptimized);
        let health = HealthTracker::new();
        health.mark(BackendKind::Gemini, false);

        let decision = engine
            .select(&TaskRequirements::default(), &health)
            .unwrap();
        assert_eq!(decision.backend, BackendKind::OpenAi);
    }

    #[test]
    fn no_eligible_backend_errors() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::Gemini],
            RoutingStrategy::CostOptimized,
        );
        let health = HealthTracker::new();
        health.mark(BackendKind::Anthropic, false);
        health.mark(BackendKind::Gemini, false);

        let err = engine
            .select(&TaskRequirements::default(), &health)
            .unwrap_err();
        assert!(matches!(err, ManifoldError::NoEligibleBackend { .. }));
    }

    #[test]
    fn offline_forces_local_backend() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::Ollama],
            RoutingStrategy::CostOptimized,
        );
        let req = TaskRequirements {
            offline_only: true,
            ..TaskRequirements::default()
        };
        let decision = engine.select(&req, &HealthTracker::new()).unwrap();
        assert_eq!(decision.backend, BackendKind::Ollama);
        assert_eq!(decision.model, "llama3.1:8b");
    }

    #[test]
    fn offline_without_local_backend_is_config_error() {
        let engine = engine(&[BackendKind::Anthropic], RoutingStrategy::CostOptimized);
        let req = TaskRequirements {
            offline_only: true,
            ..TaskRequirements::default()
        };
        let err = engine.select(&req, &HealthTracker::new()).unwrap_err();
        assert!(matches!(err, ManifoldError::Config(_)));
    }

    #[test]
    fn local_first_takes_healthy_local() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::Ollama],
            RoutingStrategy::LocalFirst,
        );
        let decision = engine
            .select(&TaskRequirements::default(), &HealthTracker::new())
            .unwrap();
        assert_eq!(decision.backend, BackendKind::Ollama);
        assert_eq!(decision.reason, "local-first strategy");
    }

    #[test]
    fn local_first_degrades_when_local_unhealthy() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::Ollama],
            RoutingStrategy::LocalFirst,
        );
        let health = HealthTracker::new();
        health.mark(BackendKind::Ollama, false);

        let decision = engine
            .select(&TaskRequirements::default(), &health)
            .unwrap();
        assert_eq!(decision.backend, BackendKind::Anthropic);
    }

    #[test]
    fn preferred_backend_wins_when_healthy() {
        let engine = engine(&all_clouds(), RoutingStrategy::CostOptimized);
        let req = TaskRequirements {
            preferred: Some(BackendKind::Anthropic),
            ..TaskRequirements::default()
        };

        let decision = engine.select(&req, &HealthTracker::new()).unwrap();
        assert_eq!(decision.backend, BackendKind::Anthropic);
        assert!(decision.reason.contains("preferred"));

        let health = HealthTracker::new();
        health.mark(BackendKind::Anthropic, false);
        let decision = engine.select(&req, &health).unwrap();
        assert_eq!(decision.backend, BackendKind::Gemini);
    }

    #[test]
    fn tool_requirement_excludes_local() {
        // Ollama is free, so cost-optimized would pick it without the filter.
        let engine = engine(
            &[BackendKind::Ollama, BackendKind::Gemini],
            RoutingStrategy::CostOptimized,
        );
        let req = TaskRequirements {
            require_tool_calls: true,
            ..TaskRequirements::default()
        };
        let decision = engine.select(&req, &HealthTracker::new()).unwrap();
        assert_eq!(decision.backend, BackendKind::Gemini);
    }

    #[test]
    fn cost_ceiling_is_a_hard_filter() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::Gemini],
            RoutingStrategy::LatencyOptimized,
        );
        let req = TaskRequirements {
            max_cost_per_mtok: Some(3.0),
            ..TaskRequirements::default()
        };
        let decision = engine.select(&req, &HealthTracker::new()).unwrap();
        assert_eq!(decision.backend, BackendKind::Gemini);
    }

    #[test]
    fn cascading_maps_complexity_to_rungs() {
        let mut configured = all_clouds();
        configured.push(BackendKind::Ollama);
        let engine = engine(&configured, RoutingStrategy::Cascading);
        let health = HealthTracker::new();

        let cases = [
            (TaskComplexity::Simple, BackendKind::Gemini),
            (TaskComplexity::Moderate, BackendKind::Gemini),
            (TaskComplexity::Complex, BackendKind::OpenAi),
            (TaskComplexity::Strategic, BackendKind::Anthropic),
        ];
        for (complexity, expected) in cases {
            let req = TaskRequirements {
                complexity,
                ..TaskRequirements::default()
            };
            let decision = engine.select(&req, &health).unwrap();
            assert_eq!(decision.backend, expected, "{complexity}");
        }
    }

    #[test]
    fn cascading_falls_back_when_rung_ineligible() {
        let engine = engine(
            &[BackendKind::Anthropic, BackendKind::Gemini],
            RoutingStrategy::Cascading,
        );
        let health = HealthTracker::new();
        health.mark(BackendKind::Anthropic, false);

        let req = TaskRequirements {
            complexity: TaskComplexity::Strategic,
            ..TaskRequirements::default()
        };
        let decision = engine.select(&req, &health).unwrap();
        assert_eq!(decision.backend, BackendKind::Gemini);
        assert!(decision.reason.contains("not eligible"));
    }

    #[test]
    fn predictive_routes_by_task_type() {
        let mut configured = all_clouds();
        configured.push(BackendKind::Ollama);
        let engine = engine(&configured, RoutingStrategy::Predictive);
        let health = HealthTracker::new();

        let code = TaskRequirements {
            task_type: TaskType::Code,
            ..TaskRequirements::default()
        };
        assert_eq!(
            engine.select(&code, &health).unwrap().backend,
            BackendKind::Ollama
        );

        // Structured output plus tools outranks the per-type preference.
        let structured_code = TaskRequirements {
            task_type: TaskType::Code,
            require_structured_output: true,
            require_tool_calls: true,
            ..TaskRequirements::default()
        };
        assert_eq!(
            engine.select(&structured_code, &health).unwrap().backend,
            BackendKind::OpenAi
        );
    }

    #[test]
    fn model_table_has_general_fallback() {
        assert_eq!(
            model_for(BackendKind::Anthropic, TaskType::General),
            "claude-sonnet-4-20250514"
        );
        assert_eq!(model_for(BackendKind::Ollama, TaskType::Code), "qwen2.5-coder:7b");
        assert_eq!(model_for(BackendKind::Gemini, TaskType::Summarize), "gemini-2.5-flash");
    }

    #[test]
    fn fallback_chain_is_fixed_order_filtered_to_configured() {
        let engine = engine(
            &[BackendKind::Gemini, BackendKind::Anthropic],
            RoutingStrategy::CostOptimized,
        );
        let req = TaskRequirements {
            task_type: TaskType::Code,
            ..TaskRequirements::default()
        };
        // Static code order is local, then mid-cost cloud, then top cloud.
        assert_eq!(
            engine.fallback_chain(&req),
            vec![BackendKind::Anthropic, BackendKind::Gemini]
        );
    }

    #[test]
    fn offline_fallback_chain_is_local_only() {
        let mut configured = all_clouds();
        configured.push(BackendKind::Ollama);
        let engine = engine(&configured, RoutingStrategy::CostOptimized);
        let req = TaskRequirements {
            task_type: TaskType::Code,
            offline_only: true,
            ..TaskRequirements::default()
        };
        assert_eq!(engine.fallback_chain(&req), vec![BackendKind::Ollama]);
    }

    #[test]
    fn next_candidate_skips_excluded_backends() {
        let engine = engine(&all_clouds(), RoutingStrategy::CostOptimized);
        let health = HealthTracker::new();
        let req = TaskRequirements::default();

        let next = engine
            .next_candidate(&req, &[BackendKind::Gemini], &health)
            .unwrap();
        assert_eq!(next.backend, BackendKind::OpenAi);
        assert!(next.reason.starts_with("failover:"));

        let exhausted = engine.next_candidate(
            &req,
            &[BackendKind::Gemini, BackendKind::OpenAi, BackendKind::Anthropic],
            &health,
        );
        assert!(exhausted.is_none());
    }

    #[test]
    fn selection_is_deterministic() {
        let engine = engine(&all_clouds(), RoutingStrategy::Cascading);
        let health = HealthTracker::new();
        let req = TaskRequirements {
            complexity: TaskComplexity::Complex,
            ..TaskRequirements::default()
        };

        let first = engine.select(&req, &health).unwrap();
        let second = engine.select(&req, &health).unwrap();
        assert_eq!(first.backend, second.backend);
        assert_eq!(first.model, second.model);
        assert_eq!(first.reason, second.reason);
    }
}
