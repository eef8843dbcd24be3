// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term tier facade: facts, entities, and episodes over a store.
//!
//! The facade owns the policy the store does not: episode capacity and
//! minimum length, entity merge-on-repeat, and the confidence gate for
//! surfacing entities in search results.

use std::sync::Arc;

use chrono::Utc;
use manifold_core::error::ManifoldError;
use serde_json::Value;
use uuid::Uuid;

use crate::short_term::ConversationSnapshot;
use crate::store::{LongTermStats, LongTermStore};
use crate::types::{
    Entity, EntityKind, Episode, Importance, MemorySearchResult, MemorySource,
};

/// Confidence assigned to explicitly tracked entities. Mirrors the
/// explicit-over-extracted convention: anything a caller names directly
/// is trusted well above the default surfacing threshold.
const EXPLICIT_CONFIDENCE: f64 = 0.9;

/// Policy knobs for the long-term tier.
#[derive(Debug, Clone, Copy)]
pub struct LongTermOptions {
    pub max_episodes: usize,
    pub min_episode_messages: usize,
    /// Entities below this confidence are never surfaced in search.
    pub entity_confidence_threshold: f64,
}

impl Default for LongTermOptions {
    fn default() -> Self {
        Self {
            max_episodes: 100,
            min_episode_messages: 5,
            entity_confidence_threshold: 0.7,
        }
    }
}

/// Facade over a [`LongTermStore`].
pub struct LongTermMemory {
    store: Arc<dyn LongTermStore>,
    options: LongTermOptions,
}

impl LongTermMemory {
    pub fn new(store: Arc<dyn LongTermStore>, options: LongTermOptions) -> Self {
        Self { store, options }
    }

    /// Stores a durable fact and returns its id.
    pub async fn store_fact(
        &self,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<String, ManifoldError> {
        let fact = crate::types::Fact {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        let id = fact.id.clone();
        self.store.put_fact(fact).await?;
        Ok(id)
    }

    /// Tracks an entity by name, merging with any existing record.
    ///
    /// A repeat mention bumps `mention_count` and `last_mentioned` and
    /// merges `attributes` key-by-key (new keys win); it never lowers
    /// an existing confidence.
    pub async fn track_entity(
        &self,
        name: &str,
        kind: EntityKind,
        attributes: Value,
    ) -> Result<String, ManifoldError> {
        let now = Utc::now();
        if let Some(mut existing) = self.store.entity_by_name(name).await? {
            existing.mention_count += 1;
            existing.last_mentioned = now;
            existing.confidence = existing.confidence.max(EXPLICIT_CONFIDENCE);
            merge_attributes(&mut existing.attributes, attributes);
            let id = existing.id.clone();
            self.store.put_entity(existing).await?;
            return Ok(id);
        }

        tracing::debug!(name, kind = %kind, "tracking new entity");
        let entity = Entity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind,
            attributes,
            first_mentioned: now,
            last_mentioned: now,
            mention_count: 1,
            confidence: EXPLICIT_CONFIDENCE,
            related_entities: Vec::new(),
        };
        let id = entity.id.clone();
        self.store.put_entity(entity).await?;
        Ok(id)
    }

    /// Freezes a conversation snapshot into an episode.
    ///
    /// Rejects snapshots shorter than `min_episode_messages`; at
    /// capacity the oldest episode is evicted first.
    pub async fn create_episode(
        &self,
        title: &str,
        summary: &str,
        tags: Vec<String>,
        snapshot: ConversationSnapshot,
    ) -> Result<String, ManifoldError> {
        if snapshot.messages.len() < self.options.min_episode_messages {
            return Err(ManifoldError::InvalidInput(format!(
                "episode needs at least {} messages, conversation has {}",
                self.options.min_episode_messages,
                snapshot.messages.len()
            )));
        }

        while self.store.episode_count().await? >= self.options.max_episodes {
            match self.store.evict_oldest_episode().await? {
                Some(id) => tracing::debug!(episode_id = %id, "episode capacity reached, evicted oldest"),
                None => break,
            }
        }

        let now = Utc::now();
        let mut participants: Vec<String> = Vec::new();
        for message in &snapshot.messages {
            let role = message.role.to_string();
            if !participants.contains(&role) {
                participants.push(role);
            }
        }

        let episode = Episode {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            messages: snapshot.messages,
            started_at: snapshot.started_at.unwrap_or(now),
            ended_at: snapshot.ended_at.unwrap_or(now),
            participants,
            entities: Vec::new(),
            tags,
            outcome: None,
            importance: Importance::Medium,
        };
        let id = episode.id.clone();
        self.store.put_episode(episode).await?;
        Ok(id)
    }

    /// Long-term leg of the tier fan-out: facts (exact and semantic),
    /// entities above the confidence gate, and episodes.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySearchResult>, ManifoldError> {
        let mut results = Vec::new();

        for hit in self.store.search_facts(query, limit).await? {
            results.push(MemorySearchResult {
                id: hit.fact.id,
                source: if hit.exact {
                    MemorySource::ExactMatch
                } else {
                    MemorySource::Semantic
                },
                score: hit.score,
                content: hit.fact.content,
                metadata: hit.fact.metadata,
            });
        }

        for entity in self.store.search_entities(query, limit).await? {
            if entity.confidence < self.options.entity_confidence_threshold {
                continue;
            }
            results.push(MemorySearchResult {
                id: entity.id,
                source: MemorySource::Entity,
                score: entity.confidence,
                content: entity.name,
                metadata: Some(entity.attributes),
            });
        }

        for (episode, score) in self.store.search_episodes(query, limit).await? {
            results.push(MemorySearchResult {
                id: episode.id,
                source: MemorySource::Episodic,
                score,
                content: format!("{}: {}", episode.title, episode.summary),
                metadata: Some(serde_json::json!({ "tags": episode.tags })),
            });
        }

        Ok(results)
    }

    pub async fn stats(&self) -> Result<LongTermStats, ManifoldError> {
        self.store.stats().await
    }

    pub async fn close(&self) -> Result<(), ManifoldError> {
        self.store.close().await
    }
}

/// Key-by-key object merge; non-object updates replace wholesale, null
/// updates are ignored.
fn merge_attributes(existing: &mut Value, update: Value) {
    match (existing, update) {
        (Value::Object(current), Value::Object(update)) => {
            for (key, value) in update {
                current.insert(key, value);
            }
        }
        (existing, update) if !update.is_null() => *existing = update,
        _ => {}
    }
}
