// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term storage trait and the in-memory reference implementation.
//!
//! `LongTermStore` is the seam for durable backends; `InMemoryStore`
//! keeps everything in HashMaps behind a tokio `RwLock` and scores
//! search hits by substring and token overlap. It is the default store
//! and the one the test suites run against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use manifold_core::error::ManifoldError;
use tokio::sync::RwLock;

use crate::types::{Entity, Episode, Fact};

/// One scored fact hit. `exact` distinguishes a verbatim substring
/// match from token overlap so the manager can band them differently.
#[derive(Debug, Clone, PartialEq)]
pub struct FactHit {
    pub fact: Fact,
    pub score: f64,
    pub exact: bool,
}

/// Per-record-type counts reported by [`LongTermStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LongTermStats {
    pub facts: usize,
    pub entities: usize,
    pub episodes: usize,
}

/// Durable storage for facts, entities, and episodes.
///
/// Implementations are append-oriented: records are inserted or
/// replaced whole, never partially updated in place. Capacity rules
/// live in the facade above, not here.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn put_fact(&self, fact: Fact) -> Result<(), ManifoldError>;

    /// Scored facts matching `query`, best first, at most `limit`.
    async fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<FactHit>, ManifoldError>;

    /// Inserts or replaces an entity by id.
    async fn put_entity(&self, entity: Entity) -> Result<(), ManifoldError>;

    /// Case-insensitive lookup by entity name.
    async fn entity_by_name(&self, name: &str) -> Result<Option<Entity>, ManifoldError>;

    async fn search_entities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Entity>, ManifoldError>;

    async fn put_episode(&self, episode: Episode) -> Result<(), ManifoldError>;

    async fn episode_count(&self) -> Result<usize, ManifoldError>;

    /// Removes the episode with the earliest start time, returning its id.
    async fn evict_oldest_episode(&self) -> Result<Option<String>, ManifoldError>;

    /// Scored episodes matching `query` against title, summary, and tags.
    async fn search_episodes(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Episode, f64)>, ManifoldError>;

    async fn stats(&self) -> Result<LongTermStats, ManifoldError>;

    /// Releases any underlying handles. Must be idempotent.
    async fn close(&self) -> Result<(), ManifoldError>;
}

/// Scores `text` against `query`, both case-insensitive.
///
/// A verbatim substring match scores 1.0 and is flagged exact;
/// otherwise the score is the fraction of query tokens present in the
/// text. Returns `None` when nothing matches or the query is blank.
pub(crate) fn match_score(text: &str, query: &str) -> Option<(f64, bool)> {
    let text = text.to_lowercase();
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    if text.contains(&query) {
        return Some((1.0, true));
    }
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let hits = tokens.iter().filter(|token| text.contains(**token)).count();
    if hits == 0 {
        return None;
    }
    Some((hits as f64 / tokens.len() as f64, false))
}

#[derive(Debug, Default)]
struct StoreInner {
    facts: HashMap<String, Fact>,
    entities: HashMap<String, Entity>,
    episodes: HashMap<String, Episode>,
}

/// Reference store: process-local, no persistence.
///
/// `close` only flips a flag so shutdown paths can be exercised; there
/// is no external handle to release.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LongTermStore for InMemoryStore {
    async fn put_fact(&self, fact: Fact) -> Result<(), ManifoldError> {
        self.inner.write().await.facts.insert(fact.id.clone(), fact);
        Ok(())
    }

    async fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<FactHit>, ManifoldError> {
        let inner = self.inner.read().await;
        let mut hits: Vec<FactHit> = inner
            .facts
            .values()
            .filter_map(|fact| {
                match_score(&fact.content, query).map(|(score, exact)| FactHit {
                    fact: fact.clone(),
                    score,
                    exact,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.fact.created_at.cmp(&a.fact.created_at))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn put_entity(&self, entity: Entity) -> Result<(), ManifoldError> {
        self.inner
            .write()
            .await
            .entities
            .insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn entity_by_name(&self, name: &str) -> Result<Option<Entity>, ManifoldError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entities
            .values()
            .find(|entity| entity.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn search_entities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Entity>, ManifoldError> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Entity> = inner
            .entities
            .values()
            .filter(|entity| {
                let haystack = format!("{} {}", entity.name, entity.attributes);
                match_score(&haystack, query).is_some()
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.mention_count.cmp(&a.mention_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn put_episode(&self, episode: Episode) -> Result<(), ManifoldError> {
        self.inner
            .write()
            .await
            .episodes
            .insert(episode.id.clone(), episode);
        Ok(())
    }

    async fn episode_count(&self) -> Result<usize, ManifoldError> {
        Ok(self.inner.read().await.episodes.len())
    }

    async fn evict_oldest_episode(&self) -> Result<Option<String>, ManifoldError> {
        let mut inner = self.inner.write().await;
        let oldest = inner
            .episodes
            .values()
            .min_by(|a, b| {
                a.started_at
                    .cmp(&b.started_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|episode| episode.id.clone());
        if let Some(id) = &oldest {
            inner.episodes.remove(id);
        }
        Ok(oldest)
    }

    async fn search_episodes(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Episode, f64)>, ManifoldError> {
        let inner = self.inner.read().await;
        let mut hits: Vec<(Episode, f64)> = inner
            .episodes
            .values()
            .filter_map(|episode| {
                let haystack = format!(
                    "{} {} {}",
                    episode.title,
                    episode.summary,
                    episode.tags.join(" ")
                );
                match_score(&haystack, query).map(|(score, _)| (episode.clone(), score))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.0.started_at.cmp(&a.0.started_at))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn stats(&self) -> Result<LongTermStats, ManifoldError> {
        let inner = self.inner.read().await;
        Ok(LongTermStats {
            facts: inner.facts.len(),
            entities: inner.entities.len(),
            episodes: inner.episodes.len(),
        })
    }

    async fn close(&self) -> Result<(), ManifoldError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("in-memory store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use manifold_core::types::ChatMessage;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::types::{EntityKind, Importance};

    fn fact(content: &str, age: Duration) -> Fact {
        Fact {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            metadata: None,
            created_at: Utc::now() - age,
        }
    }

    fn entity(name: &str, confidence: f64) -> Entity {
        let now = Utc::now();
        Entity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind: EntityKind::Tool,
            attributes: json!({}),
            first_mentioned: now,
            last_mentioned: now,
            mention_count: 1,
            confidence,
            related_entities: Vec::new(),
        }
    }

    fn episode(title: &str, started: chrono::DateTime<Utc>) -> Episode {
        Episode {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            summary: String::new(),
            messages: vec![ChatMessage::user("hi")],
            started_at: started,
            ended_at: started,
            participants: vec!["user".to_string()],
            entities: Vec::new(),
            tags: Vec::new(),
            outcome: None,
            importance: Importance::Medium,
        }
    }

    #[test]
    fn match_score_exact_substring() {
        assert_eq!(match_score("The Rollout Plan", "rollout plan"), Some((1.0, true)));
    }

    #[test]
    fn match_score_token_overlap_fraction() {
        let (score, exact) = match_score("the rollout finished early", "rollout plan").unwrap();
        assert!(!exact);
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn match_score_misses_and_blank_queries() {
        assert_eq!(match_score("unrelated text", "rollout"), None);
        assert_eq!(match_score("anything", "   "), None);
    }

    #[tokio::test]
    async fn fact_search_ranks_exact_above_partial() {
        let store = InMemoryStore::new();
        store
            .put_fact(fact("deploy rollout finished", Duration::zero()))
            .await
            .unwrap();
        store
            .put_fact(fact("the rollout is staged", Duration::zero()))
            .await
            .unwrap();

        let hits = store.search_facts("deploy rollout", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].exact);
        assert_eq!(hits[0].fact.content, "deploy rollout finished");
        assert!(!hits[1].exact);
        assert!(hits[1].score < hits[0].score);
    }

    #[tokio::test]
    async fn fact_search_breaks_score_ties_by_recency() {
        let store = InMemoryStore::new();
        store.put_fact(fact("rollout one", Duration::hours(2))).await.unwrap();
        store.put_fact(fact("rollout two", Duration::hours(1))).await.unwrap();

        let hits = store.search_facts("rollout", 10).await.unwrap();
        assert_eq!(hits[0].fact.content, "rollout two");
    }

    #[tokio::test]
    async fn fact_search_respects_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .put_fact(fact(&format!("rollout {i}"), Duration::zero()))
                .await
                .unwrap();
        }

        let hits = store.search_facts("rollout", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn entity_lookup_is_case_insensitive() {
        let store = InMemoryStore::new();
        store.put_entity(entity("Terraform", 0.9)).await.unwrap();

        let found = store.entity_by_name("terraform").await.unwrap();
        assert_eq!(found.map(|e| e.name), Some("Terraform".to_string()));
    }

    #[tokio::test]
    async fn entity_search_matches_attributes_too() {
        let store = InMemoryStore::new();
        let mut subject = entity("Build Bot", 0.9);
        subject.attributes = json!({ "language": "rust" });
        store.put_entity(subject).await.unwrap();

        let matches = store.search_entities("rust", 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "Build Bot");
    }

    #[tokio::test]
    async fn evict_oldest_episode_removes_earliest_start() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let old = episode("old", now - Duration::hours(2));
        let old_id = old.id.clone();
        store.put_episode(old).await.unwrap();
        store.put_episode(episode("new", now)).await.unwrap();

        let evicted = store.evict_oldest_episode().await.unwrap();
        assert_eq!(evicted, Some(old_id));
        assert_eq!(store.episode_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = InMemoryStore::new();
        assert!(!store.is_closed());
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_closed());
    }
}
