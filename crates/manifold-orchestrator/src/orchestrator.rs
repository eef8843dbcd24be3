// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The front door: one struct wiring every subsystem into a request pipeline.
//!
//! [`Orchestrator::new`] builds a connection pool per enabled backend, the
//! routing policy engine, the health tracker, tiered memory, and (when an
//! embedder is supplied) the retrieval pipeline. [`Orchestrator::chat`] then
//! runs a full turn: classify, route, remember, augment, dispatch with
//! retries, fail over, account.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use manifold_config::{ContextInjection, ManifoldConfig, MemoryConfig, PoolConfig, RagConfig};
use manifold_core::{
    Backend, BackendFactory, BackendKind, ChatMessage, Embedder, GenerateOptions,
    GenerateResponse, ManifoldError, Role, TokenUsage,
};
use manifold_memory::{
    LongTermOptions, MemoryManager, MemoryOptions, MemorySearchResult, ShortTermOptions,
    WorkingOptions,
};
use manifold_pool::{ConnectionFactory, Pool, PoolOptions, PoolStats};
use manifold_rag::{
    ChunkConfig, ContextFormat, Document, EmbeddingCache, EmbeddingService, RetrievalConfig,
    VectorIndex, chunk_markdown, chunk_text, inject_context, retrieve,
};
use manifold_resilience::{GenerateRequest, RetryPolicy, execute};
use manifold_router::{
    HealthTracker, PolicyEngine, RoutingDecision, RoutingOptions, TaskClassifier, TaskProfile,
    TaskRequirements, TaskType, capabilities_of,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ceiling on a single health probe, independent of the retry policy's
/// call timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapts a [`BackendFactory`] to the pool's [`ConnectionFactory`] seam.
///
/// Every pooled connection is a boxed backend client; validation reuses the
/// client's own liveness ping.
pub struct BackendConnector {
    factory: Arc<dyn BackendFactory>,
}

impl BackendConnector {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl ConnectionFactory for BackendConnector {
    type Connection = Box<dyn Backend>;

    async fn create(&self) -> Result<Self::Connection, ManifoldError> {
        self.factory.build().await
    }

    async fn destroy(&self, conn: Self::Connection) -> Result<(), ManifoldError> {
        conn.close().await
    }

    async fn validate(&self, conn: &mut Self::Connection) -> bool {
        conn.ping().await.is_ok()
    }
}

/// Per-backend runtime state: the pool serving requests, and a dedicated
/// probe client kept outside the pool so health checks never compete with
/// request traffic for connections.
struct BackendHandle {
    factory: Arc<dyn BackendFactory>,
    pool: Pool<BackendConnector>,
    probe: Mutex<Option<Box<dyn Backend>>>,
}

/// Retrieval pipeline state, present only when an embedder was supplied.
struct RagEngine {
    embeddings: EmbeddingService,
    /// Built on first ingest, once the embedding dimension is known.
    index: OnceLock<VectorIndex>,
    chunking: ChunkConfig,
    retrieval: RetrievalConfig,
    format: ContextFormat,
}

/// Per-turn accounting attached to every [`ChatOutcome`].
#[derive(Debug, Clone)]
pub struct ChatMetrics {
    /// Wall-clock time across the whole pipeline, not just the winning call.
    pub latency_ms: u64,
    pub tokens: TokenUsage,
    /// Estimated from the capability table's average cost per million tokens.
    pub cost_usd: f64,
}

/// Everything a front end needs to render one completed chat turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: GenerateResponse,
    /// The decision actually dispatched, reflecting any failover.
    pub decision: RoutingDecision,
    pub metrics: ChatMetrics,
}

/// Owns every subsystem and runs the request pipeline.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct Orchestrator {
    config: ManifoldConfig,
    /// Enabled backends in configuration order.
    configured: Vec<BackendKind>,
    backends: HashMap<BackendKind, BackendHandle>,
    policy: PolicyEngine,
    health: HealthTracker,
    classifier: TaskClassifier,
    memory: MemoryManager,
    rag: Option<RagEngine>,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("configured", &self.configured)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds the full pipeline from configuration plus one factory per
    /// enabled backend.
    ///
    /// Factories are matched to backends by their `kind`; every enabled
    /// backend must have one, and factories for disabled backends are
    /// ignored. Must be called from within a tokio runtime: each pool
    /// spawns its maintenance tasks on creation.
    pub fn new(
        config: ManifoldConfig,
        factories: Vec<Arc<dyn BackendFactory>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, ManifoldError> {
        let mut by_kind: HashMap<BackendKind, Arc<dyn BackendFactory>> = HashMap::new();
        for factory in factories {
            by_kind.insert(factory.kind(), factory);
        }

        let configured = config.configured_backends();
        let mut backends = HashMap::new();
        for kind in &configured {
            let factory = by_kind.remove(kind).ok_or_else(|| {
                ManifoldError::Config(format!(
                    "backend {kind} is enabled but no factory was registered for it"
                ))
            })?;
            let pool = Pool::new(
                BackendConnector::new(factory.clone()),
                pool_options_from(&config.pool),
            );
            backends.insert(
                *kind,
                BackendHandle {
                    factory,
                    pool,
                    probe: Mutex::new(None),
                },
            );
        }

        let policy = PolicyEngine::new(configured.clone(), RoutingOptions::from(&config.routing));
        let memory = MemoryManager::new(memory_options_from(&config.memory));
        if let Some(prompt) = &config.agent.system_prompt {
            memory.add_message(Role::System, prompt);
        }
        let rag = embedder.map(|embedder| rag_engine_from(&config.rag, embedder));
        let retry = RetryPolicy {
            max_attempts: config.retry.max_attempts,
            call_timeout: Duration::from_secs(config.retry.call_timeout_secs),
            backoff_base: Duration::from_secs(config.retry.backoff_base_secs),
            backoff_cap: Duration::from_secs(config.retry.backoff_cap_secs),
        };

        info!(
            backends = configured.len(),
            strategy = %config.routing.strategy,
            rag = rag.is_some(),
            "orchestrator ready"
        );

        Ok(Self {
            config,
            configured,
            backends,
            policy,
            health: HealthTracker::new(),
            classifier: TaskClassifier::new(),
            memory,
            rag,
            retry,
            closed: AtomicBool::new(false),
        })
    }

    /// Runs one conversational turn through the full pipeline.
    ///
    /// The message is classified against recent history, a backend is
    /// selected, the turn is recorded, the transcript is assembled (with
    /// retrieved context when RAG is active), and the request is dispatched
    /// with retries, failing over to further candidates while errors stay
    /// transient. The assistant reply is remembered before returning.
    pub async fn chat(&self, text: &str) -> Result<ChatOutcome, ManifoldError> {
        self.chat_task(text, None).await
    }

    pub(crate) async fn chat_task(
        &self,
        text: &str,
        task_type: Option<TaskType>,
    ) -> Result<ChatOutcome, ManifoldError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ManifoldError::Internal(
                "orchestrator is shut down".to_string(),
            ));
        }
        let started = Instant::now();

        // Classify against the turns that precede this one.
        let history = self.memory.history();
        let recent: Vec<&str> = history
            .iter()
            .filter(|message| message.role != Role::System)
            .rev()
            .take(3)
            .map(|message| message.content.as_str())
            .collect();
        let mut profile = self.classifier.classify(text, &recent);
        if let Some(override_type) = task_type {
            profile.task_type = override_type;
        }
        debug!(
            task_type = %profile.task_type,
            complexity = ?profile.complexity,
            reason = profile.reason,
            "message classified"
        );

        let requirements = self.requirements(&profile);
        let decision = self.policy.select(&requirements, &self.health)?;
        debug!(
            backend = %decision.backend,
            model = %decision.model,
            reason = %decision.reason,
            "routing decision"
        );

        self.memory.add_message(Role::User, text);
        let messages = self.assemble_messages(text).await;

        let (response, decision) = self.dispatch(&messages, decision, &requirements).await?;

        self.memory.add_message(Role::Assistant, &response.content);

        let capability = capabilities_of(decision.backend);
        let metrics = ChatMetrics {
            latency_ms: started.elapsed().as_millis() as u64,
            tokens: response.usage,
            cost_usd: capability.avg_cost_per_mtok * f64::from(response.usage.total_tokens)
                / 1_000_000.0,
        };
        info!(
            backend = %decision.backend,
            model = %decision.model,
            latency_ms = metrics.latency_ms,
            total_tokens = response.usage.total_tokens,
            "chat turn complete"
        );
        Ok(ChatOutcome {
            response,
            decision,
            metrics,
        })
    }

    fn requirements(&self, profile: &TaskProfile) -> TaskRequirements {
        TaskRequirements {
            task_type: profile.task_type,
            complexity: profile.complexity,
            preferred: self.config.routing.prefer,
            max_latency_ms: self.config.routing.max_latency_ms,
            max_cost_per_mtok: self.config.routing.max_cost_per_mtok,
            ..TaskRequirements::default()
        }
    }

    /// The transcript for this turn, augmented with retrieved context when
    /// the index has anything relevant.
    ///
    /// Retrieval is augmentation: a failed lookup degrades to the plain
    /// transcript instead of failing the chat.
    async fn assemble_messages(&self, query: &str) -> Vec<ChatMessage> {
        let messages = self.memory.history();
        let Some(rag) = &self.rag else {
            return messages;
        };
        let Some(index) = rag.index.get() else {
            return messages;
        };
        match retrieve(query, &rag.embeddings, index, &rag.retrieval).await {
            Ok(retrieval) if !retrieval.formatted_context.is_empty() => {
                debug!(
                    results = retrieval.results.len(),
                    approx_tokens = retrieval.approx_tokens,
                    "injecting retrieved context"
                );
                inject_context(messages, &retrieval.formatted_context, rag.format)
            }
            Ok(_) => messages,
            Err(error) => {
                warn!(%error, "context retrieval failed, continuing without");
                messages
            }
        }
    }

    /// Dispatches to the decided backend, failing over while errors stay
    /// transient.
    ///
    /// Each exhausted backend is marked unhealthy before the next candidate
    /// is asked for, so the policy engine excludes it for the TTL window.
    /// Returns the decision that actually produced the response.
    async fn dispatch(
        &self,
        messages: &[ChatMessage],
        initial: RoutingDecision,
        requirements: &TaskRequirements,
    ) -> Result<(GenerateResponse, RoutingDecision), ManifoldError> {
        let options = GenerateOptions::default();
        let mut decision = initial;
        let mut budget = self.retry.clone();
        let mut attempted: Vec<BackendKind> = Vec::new();

        loop {
            let pool = &self
                .backends
                .get(&decision.backend)
                .ok_or_else(|| {
                    ManifoldError::Internal(format!(
                        "no pool for routed backend {}",
                        decision.backend
                    ))
                })?
                .pool;
            let request = GenerateRequest {
                messages,
                model: &decision.model,
                options: &options,
            };

            let err = match execute(pool, request, &budget, None).await {
                Ok(response) => return Ok((response, decision)),
                Err(err) => err,
            };

            attempted.push(decision.backend);
            if !self.policy.options().failover_enabled || !err.is_transient() {
                return Err(err);
            }

            // Retry budget spent; this backend sits out until a probe
            // clears it.
            self.health.mark(decision.backend, false);

            match self
                .policy
                .next_candidate(requirements, &attempted, &self.health)
            {
                Some(next) => {
                    warn!(
                        failed = %decision.backend,
                        next = %next.backend,
                        error = %err,
                        "failing over"
                    );
                    decision = next;
                    budget = self.retry.with_attempts(self.config.retry.failover_attempts);
                }
                None if attempted.len() > 1 => {
                    return Err(ManifoldError::FailoverExhausted {
                        attempted,
                        source: Box::new(err),
                    });
                }
                // Never failed over, so the original error tells the
                // whole story.
                None => return Err(err),
            }
        }
    }

    /// Chunks, embeds, and indexes a document for retrieval.
    ///
    /// Returns the number of chunks indexed. The vector index is created on
    /// the first ingest, sized to the embedder's output dimension.
    pub async fn ingest_document(
        &self,
        source_id: &str,
        text: &str,
    ) -> Result<usize, ManifoldError> {
        self.ingest(source_id, text, false).await
    }

    /// Markdown-aware variant of [`Orchestrator::ingest_document`]; header
    /// lines start new chunks and are carried into chunk metadata.
    pub async fn ingest_markdown(
        &self,
        source_id: &str,
        text: &str,
    ) -> Result<usize, ManifoldError> {
        self.ingest(source_id, text, true).await
    }

    async fn ingest(
        &self,
        source_id: &str,
        text: &str,
        markdown: bool,
    ) -> Result<usize, ManifoldError> {
        let rag = self.rag.as_ref().ok_or_else(|| {
            ManifoldError::Config("document ingestion requires an embedder".to_string())
        })?;

        let chunks = if markdown {
            chunk_markdown(source_id, text, &rag.chunking)
        } else {
            chunk_text(source_id, text, &rag.chunking)
        };
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = rag.embeddings.embed_batch(&texts).await?;
        let dimension = vectors.first().map_or(0, Vec::len);

        let mut documents = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(vectors) {
            let metadata = serde_json::to_value(&chunk.metadata).map_err(|error| {
                ManifoldError::Serialization {
                    message: "chunk metadata could not be serialized".to_string(),
                    source: Some(Box::new(error)),
                }
            })?;
            documents.push(Document::new(chunk.id, chunk.content, embedding).with_metadata(metadata));
        }

        let index = rag.index.get_or_init(|| VectorIndex::new(dimension));
        let added = index.add_batch(documents)?;
        info!(source_id, chunks = added, "document ingested");
        Ok(added)
    }

    /// Searches all memory tiers and returns the merged ranking.
    pub async fn search_memory(
        &self,
        query: &str,
    ) -> Result<Vec<MemorySearchResult>, ManifoldError> {
        self.memory.search(query).await
    }

    /// The tiered memory manager, for fact storage and stats.
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Advisory health flags as seen by the routing policy.
    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn config(&self) -> &ManifoldConfig {
        &self.config
    }

    /// Point-in-time pool counters per backend, in configuration order.
    pub fn pool_stats(&self) -> Vec<(BackendKind, PoolStats)> {
        self.configured
            .iter()
            .filter_map(|kind| {
                self.backends
                    .get(kind)
                    .map(|handle| (*kind, handle.pool.stats()))
            })
            .collect()
    }

    /// Probes every configured backend once and records the results,
    /// bypassing the health tracker's TTL cache.
    pub async fn refresh_health(&self) {
        for kind in &self.configured {
            let Some(handle) = self.backends.get(kind) else {
                continue;
            };
            let healthy = probe_backend(*kind, handle).await;
            self.health.mark(*kind, healthy);
        }
    }

    /// Spawns a background loop that refreshes backend health on a fixed
    /// cadence until the token is cancelled.
    pub fn spawn_health_refresher(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        // interval() panics on a zero period.
        let period = period.max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the first immediate tick.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => orchestrator.refresh_health().await,
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Closes every pool, the probe clients, and the memory manager.
    ///
    /// Idempotent. In-flight calls finish on their already-acquired
    /// connections; new work is rejected.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for kind in &self.configured {
            let Some(handle) = self.backends.get(kind) else {
                continue;
            };
            handle.pool.close().await;
            if let Some(probe) = handle.probe.lock().await.take()
                && let Err(error) = probe.close().await
            {
                warn!(backend = %kind, %error, "probe client close failed");
            }
        }
        self.memory.shutdown().await;
        info!("orchestrator shut down");
    }
}

/// Pings via the handle's dedicated probe client, building it on first use
/// and discarding it after a failure so the next probe reconnects.
async fn probe_backend(kind: BackendKind, handle: &BackendHandle) -> bool {
    let mut probe = handle.probe.lock().await;
    let client = match probe.as_ref() {
        Some(client) => client,
        None => match handle.factory.build().await {
            Ok(client) => probe.insert(client),
            Err(error) => {
                debug!(backend = %kind, %error, "probe client build failed");
                return false;
            }
        },
    };

    match tokio::time::timeout(PROBE_TIMEOUT, client.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            debug!(backend = %kind, %error, "health probe failed");
            *probe = None;
            false
        }
        Err(_) => {
            debug!(backend = %kind, "health probe timed out");
            *probe = None;
            false
        }
    }
}

fn pool_options_from(config: &PoolConfig) -> PoolOptions {
    PoolOptions {
        min_connections: config.min_connections,
        max_connections: config.max_connections,
        acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        max_connection_age: Duration::from_secs(config.max_connection_age_secs),
        validate_interval: Duration::from_secs(config.validate_interval_secs),
    }
}

fn memory_options_from(config: &MemoryConfig) -> MemoryOptions {
    MemoryOptions {
        short_term: ShortTermOptions {
            max_messages: config.max_messages,
            ttl: chrono::Duration::seconds(config.short_term_ttl_secs as i64),
        },
        working: WorkingOptions {
            capacity: config.max_entries,
            ttl: chrono::Duration::seconds(config.working_ttl_secs as i64),
        },
        long_term: LongTermOptions {
            max_episodes: config.max_episodes,
            entity_confidence_threshold: config.entity_confidence_threshold,
            ..LongTermOptions::default()
        },
        ..MemoryOptions::default()
    }
}

fn rag_engine_from(config: &RagConfig, embedder: Arc<dyn Embedder>) -> RagEngine {
    RagEngine {
        embeddings: EmbeddingService::new(
            embedder,
            Arc::new(EmbeddingCache::with_capacity(config.cache_max_entries)),
        ),
        index: OnceLock::new(),
        chunking: ChunkConfig {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            ..ChunkConfig::default()
        },
        retrieval: RetrievalConfig {
            top_k: config.top_k,
            min_score: config.min_score,
            max_context_length: config.max_context_length,
        },
        format: match config.injection {
            ContextInjection::System => ContextFormat::System,
            ContextInjection::User => ContextFormat::User,
            ContextInjection::Inline => ContextFormat::Inline,
        },
    }
}
