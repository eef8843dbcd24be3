// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM backend for deterministic testing.
//!
//! `MockBackend` implements `Backend` with pre-scripted replies, enabling
//! fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use manifold_core::types::{BackendKind, ChatMessage, GenerateOptions, GenerateResponse, TokenUsage};
use manifold_core::{Backend, BackendFactory, ManifoldError};
use manifold_pool::ConnectionFactory;
use tokio::sync::Mutex;

/// A mock backend that returns pre-scripted replies.
///
/// Replies are popped from a FIFO queue shared by all clones, so a test can
/// keep one handle for scripting while connections made from clones consume
/// the same script. When the queue is empty a default "mock reply" is
/// returned.
pub struct MockBackend {
    kind: BackendKind,
    replies: Arc<Mutex<VecDeque<Result<String, ManifoldError>>>>,
    messages_seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    delay_ms: Arc<AtomicU64>,
    generate_calls: Arc<AtomicUsize>,
    ping_calls: Arc<AtomicUsize>,
    ping_ok: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl Clone for MockBackend {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            replies: self.replies.clone(),
            messages_seen: self.messages_seen.clone(),
            delay_ms: self.delay_ms.clone(),
            generate_calls: self.generate_calls.clone(),
            ping_calls: self.ping_calls.clone(),
            ping_ok: self.ping_ok.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl MockBackend {
    /// Create a new mock backend with an empty reply queue.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            replies: Arc::new(Mutex::new(VecDeque::new())),
            messages_seen: Arc::new(Mutex::new(Vec::new())),
            delay_ms: Arc::new(AtomicU64::new(0)),
            generate_calls: Arc::new(AtomicUsize::new(0)),
            ping_calls: Arc::new(AtomicUsize::new(0)),
            ping_ok: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a mock backend pre-loaded with the given replies.
    pub fn with_replies(
        kind: BackendKind,
        replies: Vec<Result<String, ManifoldError>>,
    ) -> Self {
        let backend = Self::new(kind);
        {
            let queue = backend.replies.clone();
            // Constructor context, no runtime yet; fill synchronously.
            let mut queue = queue
                .try_lock()
                .unwrap_or_else(|_| unreachable!("fresh mutex is uncontended"));
            queue.extend(replies);
        }
        backend
    }

    /// Queue a successful reply.
    pub async fn push_ok(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(text.into()));
    }

    /// Queue a failure.
    pub async fn push_err(&self, err: ManifoldError) {
        self.replies.lock().await.push_back(Err(err));
    }

    /// Artificial latency added to every `generate` call.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make subsequent pings succeed or fail.
    pub fn set_ping_ok(&self, ok: bool) {
        self.ping_ok.store(ok, Ordering::SeqCst);
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Message lists passed to `generate`, in call order, across all clones.
    pub async fn seen_messages(&self) -> Vec<Vec<ChatMessage>> {
        self.messages_seen.lock().await.clone()
    }

    async fn next_reply(&self) -> Result<String, ManifoldError> {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("mock reply".to_string()))
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _options: &GenerateOptions,
    ) -> Result<GenerateResponse, ManifoldError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.messages_seen.lock().await.push(messages.to_vec());

        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let content = self.next_reply().await?;
        Ok(GenerateResponse {
            content,
            usage: TokenUsage::new(10, 20),
            latency_ms: delay_ms,
        })
    }

    async fn ping(&self) -> Result<(), ManifoldError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        if self.ping_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ManifoldError::Backend {
                backend: self.kind,
                message: "mock ping failed".to_string(),
                source: None,
            })
        }
    }

    async fn close(&self) -> Result<(), ManifoldError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connection factory producing boxed clones of one [`MockBackend`].
///
/// All connections share the template's reply queue and counters, so a test
/// can script a sequence once and observe it across pooled connections.
/// Implements both the pool's `ConnectionFactory` and the core
/// `BackendFactory`, so the same mock drives pool tests and orchestrator
/// wiring.
pub struct MockBackendFactory {
    template: MockBackend,
    create_calls: AtomicUsize,
    fail_creates: AtomicU32,
}

impl MockBackendFactory {
    pub fn new(template: MockBackend) -> Self {
        Self {
            template,
            create_calls: AtomicUsize::new(0),
            fail_creates: AtomicU32::new(0),
        }
    }

    /// Make the next `n` creations fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Handle to the shared template backend for scripting and assertions.
    pub fn backend(&self) -> &MockBackend {
        &self.template
    }
}

#[async_trait]
impl ConnectionFactory for MockBackendFactory {
    type Connection = Box<dyn Backend>;

    async fn create(&self) -> Result<Self::Connection, ManifoldError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ManifoldError::Backend {
                backend: self.template.kind,
                message: "mock connection failure".to_string(),
                source: None,
            });
        }
        Ok(Box::new(self.template.clone()))
    }

    async fn destroy(&self, conn: Self::Connection) -> Result<(), ManifoldError> {
        conn.close().await
    }
}

#[async_trait]
impl BackendFactory for MockBackendFactory {
    fn kind(&self) -> BackendKind {
        self.template.kind
    }

    async fn build(&self) -> Result<Box<dyn Backend>, ManifoldError> {
        ConnectionFactory::create(self).await
    }
}
