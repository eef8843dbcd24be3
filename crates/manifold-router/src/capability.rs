// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static per-backend capability table.
//!
//! Feature support and the latency/cost averages are fixed at compile time;
//! live health is tracked separately by [`crate::health::HealthTracker`].
//! The averages are blended figures across each provider's model tiers and
//! exist for relative ordering, not billing.

use manifold_core::types::BackendKind;

/// What a backend can do and roughly what it costs to use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendCapability {
    pub kind: BackendKind,
    pub supports_structured_output: bool,
    pub supports_tool_calls: bool,
    pub supports_vision: bool,
    pub is_local: bool,
    /// Typical round-trip latency for a mid-size completion.
    pub avg_latency_ms: u64,
    /// Blended price in USD per million tokens. Zero for local inference.
    pub avg_cost_per_mtok: f64,
}

const ANTHROPIC: BackendCapability = BackendCapability {
    kind: BackendKind::Anthropic,
    supports_structured_output: true,
    supports_tool_calls: true,
    supports_vision: true,
    is_local: false,
    avg_latency_ms: 1800,
    avg_cost_per_mtok: 9.0,
};

const OPENAI: BackendCapability = BackendCapability {
    kind: BackendKind::OpenAi,
    supports_structured_output: true,
    supports_tool_calls: true,
    supports_vision: true,
    is_local: false,
    avg_latency_ms: 1200,
    avg_cost_per_mtok: 6.0,
};

const GEMINI: BackendCapability = BackendCapability {
    kind: BackendKind::Gemini,
    supports_structured_output: true,
    supports_tool_calls: true,
    supports_vision: true,
    is_local: false,
    avg_latency_ms: 1000,
    avg_cost_per_mtok: 2.5,
};

const OLLAMA: BackendCapability = BackendCapability {
    kind: BackendKind::Ollama,
    supports_structured_output: false,
    supports_tool_calls: false,
    supports_vision: false,
    is_local: true,
    avg_latency_ms: 400,
    avg_cost_per_mtok: 0.0,
};

/// Capability row for a backend. Total over [`BackendKind`].
pub fn capabilities_of(kind: BackendKind) -> &'static BackendCapability {
    match kind {
        BackendKind::Anthropic => &ANTHROPIC,
        BackendKind::OpenAi => &OPENAI,
        BackendKind::Gemini => &GEMINI,
        BackendKind::Ollama => &OLLAMA,
    }
}

/// Cloud backends ordered by ascending blended cost.
///
/// The cascading strategy reads its escalation rungs off this order:
/// cheapest first, most capable (and most expensive) last.
pub fn cloud_cost_rungs() -> Vec<BackendKind> {
    use strum::IntoEnumIterator;

    let mut rungs: Vec<BackendKind> = BackendKind::iter()
        .filter(|kind| !capabilities_of(*kind).is_local)
        .collect();
    rungs.sort_by(|a, b| {
        capabilities_of(*a)
            .avg_cost_per_mtok
            .total_cmp(&capabilities_of(*b).avg_cost_per_mtok)
    });
    rungs
}
