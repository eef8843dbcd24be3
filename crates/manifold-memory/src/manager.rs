// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory manager: one front door over the three tiers.
//!
//! Short-term and working tiers are in-process structures behind std
//! mutexes (their operations never suspend); the long-term tier is an
//! async store. `search` fans out across all three and merges hits by
//! source band, exact matches first, episodic recall last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use manifold_core::error::ManifoldError;
use manifold_core::types::{ChatMessage, Role};
use serde_json::Value;

use crate::long_term::{LongTermMemory, LongTermOptions};
use crate::short_term::{ShortTermMemory, ShortTermOptions};
use crate::store::{InMemoryStore, LongTermStats, LongTermStore, match_score};
use crate::types::{EntityKind, MemorySearchResult, MemorySource};
use crate::working::{ContextMeta, WorkingMemory, WorkingOptions};

/// Sizing and policy for all three tiers.
#[derive(Debug, Clone, Copy)]
pub struct MemoryOptions {
    pub short_term: ShortTermOptions,
    pub working: WorkingOptions,
    pub long_term: LongTermOptions,
    /// Per-tier fan-out cap and the length of the merged result list.
    pub search_limit: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            short_term: ShortTermOptions::default(),
            working: WorkingOptions::default(),
            long_term: LongTermOptions::default(),
            search_limit: 10,
        }
    }
}

/// Per-tier counts from [`MemoryManager::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub short_term_messages: usize,
    pub working_entries: usize,
    pub long_term: LongTermStats,
}

/// Front door over the short-term, working, and long-term tiers.
pub struct MemoryManager {
    short_term: Mutex<ShortTermMemory>,
    working: Mutex<WorkingMemory>,
    long_term: LongTermMemory,
    search_limit: usize,
    closed: AtomicBool,
}

impl MemoryManager {
    /// Builds a manager backed by the in-memory reference store.
    pub fn new(options: MemoryOptions) -> Self {
        Self::with_store(options, Arc::new(InMemoryStore::new()))
    }

    /// Builds a manager over a caller-supplied long-term store.
    pub fn with_store(options: MemoryOptions, store: Arc<dyn LongTermStore>) -> Self {
        Self {
            short_term: Mutex::new(ShortTermMemory::new(options.short_term)),
            working: Mutex::new(WorkingMemory::new(options.working)),
            long_term: LongTermMemory::new(store, options.long_term),
            search_limit: options.search_limit,
            closed: AtomicBool::new(false),
        }
    }

    /// Records one conversational turn, returning its entry id.
    pub fn add_message(&self, role: Role, content: &str) -> String {
        self.lock_short().add_message(role, content)
    }

    /// The live transcript, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock_short().history()
    }

    /// Sets a keyed working-tier value.
    pub fn set_context(&self, key: &str, value: Value, meta: Option<ContextMeta>) {
        self.lock_working().set(key, value, meta);
    }

    /// Reads a keyed working-tier value, bumping its access metadata.
    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.lock_working().get(key)
    }

    /// Stores a durable fact; returns its id.
    pub async fn store_fact(
        &self,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<String, ManifoldError> {
        self.long_term.store_fact(content, metadata).await
    }

    /// Tracks (or re-tracks) a named entity; returns its id.
    pub async fn track_entity(
        &self,
        name: &str,
        kind: EntityKind,
        attributes: Value,
    ) -> Result<String, ManifoldError> {
        self.long_term.track_entity(name, kind, attributes).await
    }

    /// Freezes the current short-term conversation into an episode.
    pub async fn create_episode(
        &self,
        title: &str,
        summary: &str,
        tags: Vec<String>,
    ) -> Result<String, ManifoldError> {
        let snapshot = self.lock_short().snapshot();
        self.long_term.create_episode(title, summary, tags, snapshot).await
    }

    /// Searches every tier and merges hits into one ranked list.
    ///
    /// Results are grouped by source band (exact > semantic > entity >
    /// episodic) and by score within a band. Any tier may contribute
    /// nothing; a blank query short-circuits to an empty list.
    pub async fn search(&self, query: &str) -> Result<Vec<MemorySearchResult>, ManifoldError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = self.scan_in_process_tiers(query);
        results.extend(self.long_term.search(query, self.search_limit).await?);

        results.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| b.score.total_cmp(&a.score))
        });
        results.truncate(self.search_limit);
        tracing::debug!(query, results = results.len(), "memory search complete");
        Ok(results)
    }

    /// Per-tier counts.
    pub async fn stats(&self) -> Result<MemoryStats, ManifoldError> {
        let short_term_messages = self.lock_short().len();
        let working_entries = self.lock_working().len();
        let long_term = self.long_term.stats().await?;
        Ok(MemoryStats {
            short_term_messages,
            working_entries,
            long_term,
        })
    }

    /// Closes the long-term store handle. Idempotent; a store that
    /// fails to close is logged, not propagated.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.long_term.close().await {
            tracing::warn!(%error, "long-term store close failed");
        }
    }

    fn scan_in_process_tiers(&self, query: &str) -> Vec<MemorySearchResult> {
        let now = Utc::now();
        let mut results = Vec::new();

        {
            let short = self.lock_short();
            for entry in short.entries() {
                if entry.is_expired(now) {
                    continue;
                }
                if let Ok(message) = serde_json::from_value::<ChatMessage>(entry.content.clone())
                    && let Some((score, exact)) = match_score(&message.content, query)
                {
                    results.push(MemorySearchResult {
                        id: entry.id.clone(),
                        source: band(exact),
                        score,
                        content: message.content,
                        metadata: entry.metadata.clone(),
                    });
                }
            }
        }

        {
            let working = self.lock_working();
            for (_, entry) in working.iter() {
                if entry.is_expired(now) {
                    continue;
                }
                let text = value_text(&entry.content);
                if let Some((score, exact)) = match_score(&text, query) {
                    results.push(MemorySearchResult {
                        id: entry.id.clone(),
                        source: band(exact),
                        score,
                        content: text,
                        metadata: entry.metadata.clone(),
                    });
                }
            }
        }

        results
    }

    fn lock_short(&self) -> MutexGuard<'_, ShortTermMemory> {
        self.short_term.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_working(&self) -> MutexGuard<'_, WorkingMemory> {
        self.working.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn band(exact: bool) -> MemorySource {
    if exact {
        MemorySource::ExactMatch
    } else {
        MemorySource::Semantic
    }
}

/// Text rendering of a context value for matching and display. Strings
/// come back bare, everything else as compact JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Importance;

    fn seeded_conversation(manager: &MemoryManager, turns: usize) {
        for i in 0..turns {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            manager.add_message(role, &format!("neutral turn {i}"));
        }
    }

    #[tokio::test]
    async fn transcript_round_trips_through_the_manager() {
        let manager = MemoryManager::new(MemoryOptions::default());
        manager.add_message(Role::System, "be brief");
        manager.add_message(Role::User, "hello");

        let history = manager.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn context_values_round_trip_structured() {
        let manager = MemoryManager::new(MemoryOptions::default());
        let value = json!({ "step": 3, "blocked_on": null });
        manager.set_context("pipeline", value.clone(), None);

        assert_eq!(manager.get_context("pipeline"), Some(value));
    }

    #[tokio::test]
    async fn search_merges_tiers_in_band_order() {
        let manager = MemoryManager::new(MemoryOptions::default());
        seeded_conversation(&manager, 5);

        manager
            .store_fact("deployment rollout finished cleanly", None)
            .await
            .unwrap();
        manager
            .store_fact("rollout strategy for staging", None)
            .await
            .unwrap();
        manager
            .track_entity("Deployment Bot", EntityKind::Tool, json!({}))
            .await
            .unwrap();
        manager
            .create_episode(
                "Retro",
                "we walked the deployment rollout end to end",
                vec!["ops".to_string()],
            )
            .await
            .unwrap();

        let results = manager.search("deployment rollout").await.unwrap();
        let sources: Vec<MemorySource> = results.iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            vec![
                MemorySource::ExactMatch,
                MemorySource::Semantic,
                MemorySource::Entity,
                MemorySource::Episodic,
            ],
            "got {results:#?}"
        );
    }

    #[tokio::test]
    async fn search_sees_working_tier_values() {
        let manager = MemoryManager::new(MemoryOptions::default());
        manager.set_context(
            "checklist",
            json!("rollout checklist signed off"),
            Some(ContextMeta {
                importance: Some(Importance::High),
                metadata: None,
            }),
        );

        let results = manager.search("rollout checklist").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, MemorySource::ExactMatch);
        assert_eq!(results[0].content, "rollout checklist signed off");
    }

    #[tokio::test]
    async fn blank_queries_return_nothing() {
        let manager = MemoryManager::new(MemoryOptions::default());
        manager.add_message(Role::User, "hello");
        assert!(manager.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_caps_the_merged_list() {
        let manager = MemoryManager::new(MemoryOptions {
            search_limit: 3,
            ..MemoryOptions::default()
        });
        for i in 0..5 {
            manager
                .store_fact(&format!("rollout fact {i}"), None)
                .await
                .unwrap();
        }

        let results = manager.search("rollout").await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn episode_creation_needs_a_real_conversation() {
        let manager = MemoryManager::new(MemoryOptions::default());
        manager.add_message(Role::User, "hi");

        let err = manager
            .create_episode("tiny", "s", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ManifoldError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn stats_count_every_tier() {
        let manager = MemoryManager::new(MemoryOptions::default());
        seeded_conversation(&manager, 2);
        manager.set_context("k", json!(1), None);
        manager.store_fact("a fact", None).await.unwrap();

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.short_term_messages, 2);
        assert_eq!(stats.working_entries, 1);
        assert_eq!(stats.long_term.facts, 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let manager = MemoryManager::with_store(MemoryOptions::default(), store.clone());

        manager.shutdown().await;
        manager.shutdown().await;
        assert!(store.is_closed());
    }
}
