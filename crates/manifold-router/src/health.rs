// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTL-cached backend health tracking.
//!
//! Health is advisory: a recorded `false` excludes a backend from routing,
//! while `true` or an absent entry keeps it eligible. Absence of a negative
//! signal is not failure.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use manifold_core::{ManifoldError, types::BackendKind};
use tokio::time::Instant;
use tracing::debug;

/// Last observed health of one backend.
#[derive(Debug, Clone, Copy)]
pub struct ProviderHealth {
    pub backend: BackendKind,
    pub healthy: bool,
    pub checked_at: Instant,
}

/// Concurrent health cache shared between the router and health probes.
#[derive(Debug)]
pub struct HealthTracker {
    ttl: Duration,
    entries: DashMap<BackendKind, ProviderHealth>,
}

impl HealthTracker {
    const DEFAULT_TTL: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Whether the backend is currently considered routable.
    ///
    /// Unknown backends are healthy. Entries are not expired here: a stale
    /// `false` keeps excluding a backend until some probe overwrites it.
    pub fn is_healthy(&self, kind: BackendKind) -> bool {
        self.entries.get(&kind).map(|e| e.healthy).unwrap_or(true)
    }

    /// Records an explicit health observation, replacing any cached one.
    pub fn mark(&self, kind: BackendKind, healthy: bool) {
        self.entries.insert(
            kind,
            ProviderHealth {
                backend: kind,
                healthy,
                checked_at: Instant::now(),
            },
        );
    }

    /// Runs `check` and records the outcome, unless a result newer than the
    /// TTL is cached, in which case the cached value is returned and `check`
    /// is dropped unawaited.
    pub async fn probe<Fut>(&self, kind: BackendKind, check: Fut) -> bool
    where
        Fut: Future<Output = Result<(), ManifoldError>>,
    {
        let cached = self
            .entries
            .get(&kind)
            .filter(|e| e.checked_at.elapsed() < self.ttl)
            .map(|e| e.healthy);
        if let Some(healthy) = cached {
            return healthy;
        }

        let healthy = match check.await {
            Ok(()) => true,
            Err(e) => {
                debug!(backend = %kind, error = %e, "health probe failed");
                false
            }
        };
        self.mark(kind, healthy);
        healthy
    }

    /// Observed health entries in backend declaration order. Backends that
    /// were never probed or marked are absent.
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        use strum::IntoEnumIterator;

        BackendKind::iter()
            .filter_map(|kind| self.entries.get(&kind).map(|e| *e))
            .collect()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_healthy() {
        let tracker = HealthTracker::new();
        assert!(tracker.is_healthy(BackendKind::Anthropic));
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn mark_overrides_and_snapshot_reports() {
        let tracker = HealthTracker::new();
        tracker.mark(BackendKind::Gemini, false);
        tracker.mark(BackendKind::Ollama, true);

        assert!(!tracker.is_healthy(BackendKind::Gemini));
        assert!(tracker.is_healthy(BackendKind::Ollama));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].backend, BackendKind::Gemini);
        assert!(!snapshot[0].healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_records_failure_then_caches_within_ttl() {
        let tracker = HealthTracker::with_ttl(Duration::from_secs(30));

        let healthy = tracker
            .probe(BackendKind::OpenAi, async {
                Err(ManifoldError::Internal("unreachable host".into()))
            })
            .await;
        assert!(!healthy);
        assert!(!tracker.is_healthy(BackendKind::OpenAi));

        // Within the TTL the passing check must not be consulted.
        let healthy = tracker.probe(BackendKind::OpenAi, async { Ok(()) }).await;
        assert!(!healthy);

        tokio::time::advance(Duration::from_secs(31)).await;
        let healthy = tracker.probe(BackendKind::OpenAi, async { Ok(()) }).await;
        assert!(healthy);
        assert!(tracker.is_healthy(BackendKind::OpenAi));
    }

    #[tokio::test]
    async fn probe_success_marks_healthy() {
        let tracker = HealthTracker::with_ttl(Duration::ZERO);
        tracker.mark(BackendKind::Anthropic, false);

        let healthy = tracker.probe(BackendKind::Anthropic, async { Ok(()) }).await;
        assert!(healthy);
        assert!(tracker.is_healthy(BackendKind::Anthropic));
    }
}
