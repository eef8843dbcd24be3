// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry with exponential backoff around one pooled backend call.
//!
//! All attempts against a backend share one pooled connection, acquired up
//! front and released by its guard on every exit path. Each attempt races
//! the call against `call_timeout`; a timed-out call is dropped and its
//! eventual result discarded. Only transient errors are retried.

use std::time::Duration;

use manifold_core::types::{ChatMessage, GenerateOptions, GenerateResponse};
use manifold_core::{Backend, ManifoldError};
use manifold_pool::{ConnectionFactory, Pool};
use tracing::warn;

/// Retry budget and timing for one backend.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Per-attempt ceiling on the backend call.
    pub call_timeout: Duration,
    /// Backoff before retry n is `backoff_base * 2^(n-1)`, capped.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            call_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Same timing with a different attempt budget. Failover legs run with
    /// a smaller budget than the first backend.
    pub fn with_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self.clone()
        }
    }

    /// Delay after `failed_attempt` (0-based) fails.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(failed_attempt))
            .min(self.backoff_cap)
    }
}

/// A chat generation to dispatch, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub model: &'a str,
    pub options: &'a GenerateOptions,
}

/// Observer invoked before each retry with the upcoming attempt number
/// (1-based) and the error that caused it.
pub type RetryCallback<'a> = &'a (dyn Fn(u32, &ManifoldError) + Send + Sync);

/// Runs `request` against a connection from `pool` under `policy`.
///
/// Returns the first successful response, a non-transient error
/// immediately, or the last transient error annotated with the attempt
/// count once the budget is exhausted.
pub async fn execute<F>(
    pool: &Pool<F>,
    request: GenerateRequest<'_>,
    policy: &RetryPolicy,
    on_retry: Option<RetryCallback<'_>>,
) -> Result<GenerateResponse, ManifoldError>
where
    F: ConnectionFactory,
    F::Connection: Backend,
{
    // One connection for every attempt; the guard releases it on return.
    let conn = pool.acquire().await?;
    let mut last_error: Option<ManifoldError> = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.backoff_delay(attempt - 1);
            if let Some(err) = &last_error {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
            }
            tokio::time::sleep(delay).await;
            if let (Some(callback), Some(err)) = (on_retry, &last_error) {
                callback(attempt, err);
            }
        }

        let outcome = tokio::time::timeout(
            policy.call_timeout,
            conn.generate(request.messages, request.model, request.options),
        )
        .await;

        let err = match outcome {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e,
            Err(_) => ManifoldError::Timeout {
                duration: policy.call_timeout,
            },
        };

        if !err.is_transient() {
            return Err(err);
        }
        last_error = Some(err);
    }

    match last_error {
        Some(err) => {
            warn!(attempts = policy.max_attempts, "retry budget exhausted");
            Err(annotate_attempts(err, policy.max_attempts))
        }
        None => Err(ManifoldError::Internal(
            "retry policy allowed zero attempts".to_string(),
        )),
    }
}

/// Folds the attempt count into the error a caller sees after exhaustion.
fn annotate_attempts(err: ManifoldError, attempts: u32) -> ManifoldError {
    match err {
        ManifoldError::Backend {
            backend,
            message,
            source,
        } => ManifoldError::Backend {
            backend,
            message: format!("{message} (after {attempts} attempts)"),
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use manifold_core::types::BackendKind;
    use manifold_pool::PoolOptions;
    use manifold_test_utils::{MockBackend, MockBackendFactory};

    use super::*;

    fn backend_err() -> ManifoldError {
        ManifoldError::Backend {
            backend: BackendKind::Anthropic,
            message: "upstream 529".to_string(),
            source: None,
        }
    }

    fn pool_with(replies: Vec<Result<String, ManifoldError>>) -> Pool<MockBackendFactory> {
        let factory =
            MockBackendFactory::new(MockBackend::with_replies(BackendKind::Anthropic, replies));
        Pool::new(factory, PoolOptions::default())
    }

    fn request_parts() -> (Vec<ChatMessage>, GenerateOptions) {
        (vec![ChatMessage::user("hello")], GenerateOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_needs_no_retry() {
        let pool = pool_with(vec![Ok("done".to_string())]);
        let (messages, options) = request_parts();
        let request = GenerateRequest {
            messages: &messages,
            model: "m",
            options: &options,
        };

        let response = execute(&pool, request, &RetryPolicy::default(), None)
            .await
            .unwrap();
        assert_eq!(response.content, "done");
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        let pool = pool_with(vec![
            Err(backend_err()),
            Err(backend_err()),
            Ok("recovered".to_string()),
        ]);
        let (messages, options) = request_parts();
        let request = GenerateRequest {
            messages: &messages,
            model: "m",
            options: &options,
        };

        let seen = Mutex::new(Vec::new());
        let callback = |attempt: u32, _err: &ManifoldError| {
            seen.lock().unwrap().push(attempt);
        };
        let callback: RetryCallback<'_> = &callback;

        let started = tokio::time::Instant::now();
        let response = execute(&pool, request, &RetryPolicy::default(), Some(callback))
            .await
            .unwrap();

        assert_eq!(response.content, "recovered");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        // 1s after the first failure, 2s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
        // All three attempts shared one pooled connection.
        assert_eq!(pool.stats().created_total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error_with_attempt_count() {
        let pool = pool_with(vec![
            Err(backend_err()),
            Err(backend_err()),
            Err(backend_err()),
        ]);
        let (messages, options) = request_parts();
        let request = GenerateRequest {
            messages: &messages,
            model: "m",
            options: &options,
        };

        let err = execute(&pool, request, &RetryPolicy::default(), None)
            .await
            .unwrap_err();
        match err {
            ManifoldError::Backend { message, .. } => {
                assert!(message.contains("after 3 attempts"), "{message}");
            }
            other => panic!("expected backend error, got {other}"),
        }
        // No connection leak on the error path.
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_short_circuit() {
        let pool = pool_with(vec![
            Err(ManifoldError::InvalidInput("empty prompt".to_string())),
            Ok("never reached".to_string()),
        ]);
        let (messages, options) = request_parts();
        let request = GenerateRequest {
            messages: &messages,
            model: "m",
            options: &options,
        };

        let err = execute(&pool, request, &RetryPolicy::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifoldError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_and_retry() {
        let factory = MockBackendFactory::new(MockBackend::new(BackendKind::Anthropic));
        factory.backend().set_delay(Duration::from_millis(200));
        let pool = Pool::new(factory, PoolOptions::default());

        let (messages, options) = request_parts();
        let request = GenerateRequest {
            messages: &messages,
            model: "m",
            options: &options,
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            call_timeout: Duration::from_millis(50),
            ..RetryPolicy::default()
        };

        let err = execute(&pool, request, &policy, None).await.unwrap_err();
        assert!(matches!(
            err,
            ManifoldError::Timeout { duration } if duration == Duration::from_millis(50)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempt_budget_is_rejected() {
        let pool = pool_with(vec![]);
        let (messages, options) = request_parts();
        let request = GenerateRequest {
            messages: &messages,
            model: "m",
            options: &options,
        };
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };

        let err = execute(&pool, request, &policy, None).await.unwrap_err();
        assert!(matches!(err, ManifoldError::Internal(_)));
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(16));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(20), Duration::from_secs(30));
    }

    #[test]
    fn with_attempts_keeps_timing() {
        let policy = RetryPolicy::default().with_attempts(2);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.call_timeout, Duration::from_secs(60));
    }
}
