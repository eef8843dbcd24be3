// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the request pipeline: routing, failover, memory,
//! and context injection over mock backends.

use std::sync::Arc;
use std::time::Duration;

use manifold_config::ManifoldConfig;
use manifold_core::{BackendFactory, BackendKind, ManifoldError, Role};
use manifold_orchestrator::{Orchestrator, TaskSpec};
use manifold_test_utils::{MockBackend, MockBackendFactory, MockEmbedder};
use tokio_util::sync::CancellationToken;

fn test_config(kinds: &[BackendKind]) -> ManifoldConfig {
    let mut config = ManifoldConfig::default();
    for kind in kinds {
        match kind {
            BackendKind::Anthropic => config.backends.anthropic.enabled = true,
            BackendKind::OpenAi => config.backends.openai.enabled = true,
            BackendKind::Gemini => config.backends.gemini.enabled = true,
            BackendKind::Ollama => config.backends.ollama.enabled = true,
        }
    }
    config
}

fn factory_for(kind: BackendKind) -> Arc<MockBackendFactory> {
    Arc::new(MockBackendFactory::new(MockBackend::new(kind)))
}

fn transient_error(kind: BackendKind) -> ManifoldError {
    ManifoldError::Backend {
        backend: kind,
        message: "scripted outage".to_string(),
        source: None,
    }
}

/// Cost-optimized routing with two healthy cloud backends picks the
/// cheaper one; marking it unhealthy shifts traffic to the other; marking
/// both leaves no eligible backend.
#[tokio::test]
async fn routing_follows_health_under_cost_optimization() {
    let config = test_config(&[BackendKind::Anthropic, BackendKind::Gemini]);
    let anthropic = factory_for(BackendKind::Anthropic);
    let gemini = factory_for(BackendKind::Gemini);
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone(), gemini.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    let outcome = orchestrator.chat("hello there").await.unwrap();
    assert_eq!(outcome.decision.backend, BackendKind::Gemini);
    assert_eq!(outcome.response.content, "mock reply");

    orchestrator.health().mark(BackendKind::Gemini, false);
    let outcome = orchestrator.chat("hello again").await.unwrap();
    assert_eq!(outcome.decision.backend, BackendKind::Anthropic);

    orchestrator.health().mark(BackendKind::Anthropic, false);
    let err = orchestrator.chat("anyone home?").await.unwrap_err();
    assert!(matches!(err, ManifoldError::NoEligibleBackend { .. }), "got: {err}");
}

/// A backend that keeps failing transiently exhausts its retry budget,
/// gets marked unhealthy, and the turn completes on the next candidate.
#[tokio::test(start_paused = true)]
async fn transient_failures_fail_over_to_the_next_candidate() {
    let config = test_config(&[BackendKind::Anthropic, BackendKind::Gemini]);
    let anthropic = factory_for(BackendKind::Anthropic);
    let gemini = factory_for(BackendKind::Gemini);
    for _ in 0..3 {
        gemini.backend().push_err(transient_error(BackendKind::Gemini)).await;
    }
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone(), gemini.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    let outcome = orchestrator.chat("summarize this for me").await.unwrap();

    assert_eq!(outcome.decision.backend, BackendKind::Anthropic);
    assert!(
        outcome.decision.reason.starts_with("failover:"),
        "reason: {}",
        outcome.decision.reason
    );
    assert_eq!(gemini.backend().generate_calls(), 3);
    assert_eq!(anthropic.backend().generate_calls(), 1);
    assert!(!orchestrator.health().is_healthy(BackendKind::Gemini));
}

/// With failover disabled the original backend's error surfaces directly
/// and no other backend is touched.
#[tokio::test(start_paused = true)]
async fn failover_disabled_propagates_the_original_error() {
    let mut config = test_config(&[BackendKind::Anthropic, BackendKind::Gemini]);
    config.routing.failover_enabled = false;
    let anthropic = factory_for(BackendKind::Anthropic);
    let gemini = factory_for(BackendKind::Gemini);
    for _ in 0..3 {
        gemini.backend().push_err(transient_error(BackendKind::Gemini)).await;
    }
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone(), gemini.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    let err = orchestrator.chat("hello").await.unwrap_err();
    assert!(matches!(err, ManifoldError::Backend { .. }), "got: {err}");
    assert_eq!(anthropic.backend().generate_calls(), 0);
}

/// When every candidate fails, the error names the whole attempt chain
/// and keeps the final underlying failure as its source.
#[tokio::test(start_paused = true)]
async fn exhausting_every_candidate_reports_the_attempt_chain() {
    let config = test_config(&[BackendKind::Anthropic, BackendKind::Gemini]);
    let anthropic = factory_for(BackendKind::Anthropic);
    let gemini = factory_for(BackendKind::Gemini);
    for _ in 0..3 {
        gemini.backend().push_err(transient_error(BackendKind::Gemini)).await;
    }
    // Failover legs get the smaller two-attempt budget.
    for _ in 0..2 {
        anthropic.backend().push_err(transient_error(BackendKind::Anthropic)).await;
    }
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone(), gemini.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    let err = orchestrator.chat("hello").await.unwrap_err();
    match err {
        ManifoldError::FailoverExhausted { attempted, .. } => {
            assert_eq!(attempted, vec![BackendKind::Gemini, BackendKind::Anthropic]);
        }
        other => panic!("expected FailoverExhausted, got: {other}"),
    }
    assert_eq!(gemini.backend().generate_calls(), 3);
    assert_eq!(anthropic.backend().generate_calls(), 2);
}

/// Both sides of a turn land in short-term memory, so the next request
/// carries the conversation.
#[tokio::test]
async fn chat_turns_accumulate_in_memory() {
    let config = test_config(&[BackendKind::Anthropic]);
    let anthropic = factory_for(BackendKind::Anthropic);
    anthropic.backend().push_ok("four").await;
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    orchestrator.chat("what is two plus two?").await.unwrap();

    let history = orchestrator.memory().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "four");

    orchestrator.chat("and doubled?").await.unwrap();
    let seen = anthropic.backend().seen_messages().await;
    // The second request carries the first turn.
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[1][0].content, "what is two plus two?");
}

/// An ingested document comes back as injected context on a matching
/// query, visible to the backend as a leading system message.
#[tokio::test]
async fn retrieved_context_reaches_the_backend() {
    let config = test_config(&[BackendKind::Anthropic]);
    let anthropic = factory_for(BackendKind::Anthropic);
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone()];
    let orchestrator =
        Orchestrator::new(config, factories, Some(Arc::new(MockEmbedder::new()))).unwrap();

    let added = orchestrator
        .ingest_document("runbook", "The deploy password rotates every Friday.")
        .await
        .unwrap();
    assert_eq!(added, 1);

    orchestrator
        .chat("The deploy password rotates every Friday.")
        .await
        .unwrap();

    let seen = anthropic.backend().seen_messages().await;
    let request = seen.last().expect("backend saw a request");
    assert!(
        request.iter().any(|message| {
            message.role == Role::System
                && message.content.starts_with("## Relevant Context")
                && message.content.contains("deploy password")
        }),
        "no injected context in: {request:?}"
    );
}

/// Batch execution runs every task and reports one outcome per key.
#[tokio::test]
async fn batch_runs_every_task_and_keys_outcomes() {
    let config = test_config(&[BackendKind::Anthropic]);
    let anthropic = factory_for(BackendKind::Anthropic);
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    let tasks = vec![
        TaskSpec::new("greeting", "say hello"),
        TaskSpec::new("farewell", "say goodbye"),
        TaskSpec::new("haiku", "write a haiku about rust"),
    ];
    let outcomes = orchestrator.run_batch(tasks).await;

    assert_eq!(outcomes.len(), 3);
    for key in ["greeting", "farewell", "haiku"] {
        assert!(outcomes.get(key).is_some_and(|r| r.is_ok()), "missing or failed: {key}");
    }
    // Three user turns and three replies landed in the shared transcript.
    assert_eq!(orchestrator.memory().history().len(), 6);
}

/// Health probes use a dedicated client, rebuild it after a failure, and
/// flip the advisory flag both ways.
#[tokio::test]
async fn refresh_health_probes_with_a_dedicated_client() {
    let config = test_config(&[BackendKind::Anthropic]);
    let anthropic = factory_for(BackendKind::Anthropic);
    anthropic.backend().set_ping_ok(false);
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    orchestrator.refresh_health().await;
    assert!(!orchestrator.health().is_healthy(BackendKind::Anthropic));
    assert_eq!(anthropic.create_calls(), 1);

    anthropic.backend().set_ping_ok(true);
    orchestrator.refresh_health().await;
    assert!(orchestrator.health().is_healthy(BackendKind::Anthropic));
    // The failed probe discarded its client, so the retry rebuilt one.
    assert_eq!(anthropic.create_calls(), 2);
}

/// The background refresher probes on its cadence until cancelled.
#[tokio::test(start_paused = true)]
async fn health_refresher_probes_on_cadence_until_cancelled() {
    let config = test_config(&[BackendKind::Anthropic]);
    let anthropic = factory_for(BackendKind::Anthropic);
    anthropic.backend().set_ping_ok(false);
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone()];
    let orchestrator = Arc::new(Orchestrator::new(config, factories, None).unwrap());

    let token = CancellationToken::new();
    let refresher = orchestrator.spawn_health_refresher(Duration::from_secs(5), token.clone());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!orchestrator.health().is_healthy(BackendKind::Anthropic));

    token.cancel();
    refresher.await.unwrap();
}

/// Shutdown closes pooled connections and rejects new work, and calling
/// it again is harmless.
#[tokio::test]
async fn shutdown_closes_pools_and_rejects_new_work() {
    let config = test_config(&[BackendKind::Anthropic]);
    let anthropic = factory_for(BackendKind::Anthropic);
    let factories: Vec<Arc<dyn BackendFactory>> = vec![anthropic.clone()];
    let orchestrator = Orchestrator::new(config, factories, None).unwrap();

    orchestrator.chat("hello").await.unwrap();
    orchestrator.shutdown().await;
    orchestrator.shutdown().await;

    assert!(anthropic.backend().is_closed());
    let err = orchestrator.chat("hello?").await.unwrap_err();
    assert!(matches!(err, ManifoldError::Internal(_)));
}
