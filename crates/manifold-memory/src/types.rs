// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record types shared by the memory tiers.

use chrono::{DateTime, Utc};
use manifold_core::types::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How much an entry matters when the working tier has to make room.
///
/// Eviction scores multiply this weight by the entry's access count, so
/// a frequently read `Low` entry can outlive an untouched `High` one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Importance {
    /// Numeric weight used by the working tier's eviction score.
    pub fn weight(self) -> f64 {
        match self {
            Importance::Low => 1.0,
            Importance::Medium => 2.0,
            Importance::High => 3.0,
            Importance::Critical => 4.0,
        }
    }
}

/// Discriminates what a [`MemoryEntry`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// One conversational turn in the short-term transcript.
    Message,
    /// A keyed context value in the working tier.
    Context,
}

/// One entry in the short-term or working tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub kind: MemoryKind,
    /// Stored verbatim; callers get back exactly what they put in.
    pub content: Value,
    pub metadata: Option<Value>,
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u32,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// Creates an entry with a fresh id and default importance.
    pub fn new(kind: MemoryKind, content: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content,
            metadata: None,
            importance: Importance::default(),
            created_at: Utc::now(),
            expires_at: None,
            access_count: 0,
            last_accessed_at: None,
        }
    }

    /// Whether the entry's TTL has elapsed at `now`. Entries without an
    /// `expires_at` never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A durable fact stored in the long-term tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Category of a tracked entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
    Concept,
    Tool,
    #[default]
    Other,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::Location => "location",
            EntityKind::Concept => "concept",
            EntityKind::Tool => "tool",
            EntityKind::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// A named thing the conversation keeps referring to.
///
/// Repeat tracking of the same name bumps `mention_count` and
/// `last_mentioned` instead of creating a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    /// Free-form attribute object; merged key-by-key on repeat tracking.
    pub attributes: Value,
    pub first_mentioned: DateTime<Utc>,
    pub last_mentioned: DateTime<Utc>,
    pub mention_count: u32,
    /// In `[0, 1]`. Entities below the configured threshold are kept but
    /// never surfaced in search results.
    pub confidence: f64,
    #[serde(default)]
    pub related_entities: Vec<String>,
}

/// A summarized, taggable segment of a past conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub messages: Vec<ChatMessage>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub participants: Vec<String>,
    pub entities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub outcome: Option<String>,
    pub importance: Importance,
}

/// Which tier (and match mode) produced a search result.
///
/// Declaration order is ranking order: results are grouped by source
/// first, score second, so an exact hit always outranks a semantic one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MemorySource {
    ExactMatch,
    Semantic,
    Entity,
    Episodic,
}

/// One ranked hit from [`MemoryManager::search`](crate::MemoryManager::search).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySearchResult {
    /// Id of the underlying record (entry, fact, entity, or episode).
    pub id: String,
    pub source: MemorySource,
    /// Relevance within the source band, in `[0, 1]`.
    pub score: f64,
    pub content: String,
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_weights_are_strictly_increasing() {
        let weights = [
            Importance::Low.weight(),
            Importance::Medium.weight(),
            Importance::High.weight(),
            Importance::Critical.weight(),
        ];
        for pair in weights.windows(2) {
            assert!(pair[0] < pair[1], "weights should increase: {weights:?}");
        }
    }

    #[test]
    fn entry_without_ttl_never_expires() {
        let entry = MemoryEntry::new(MemoryKind::Context, Value::Null);
        assert!(!entry.is_expired(Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn entry_expires_at_deadline() {
        let mut entry = MemoryEntry::new(MemoryKind::Message, Value::Null);
        let deadline = entry.created_at + chrono::Duration::minutes(5);
        entry.expires_at = Some(deadline);

        assert!(!entry.is_expired(deadline - chrono::Duration::seconds(1)));
        assert!(entry.is_expired(deadline));
    }

    #[test]
    fn source_order_ranks_exact_first() {
        let mut sources = vec![
            MemorySource::Episodic,
            MemorySource::Semantic,
            MemorySource::ExactMatch,
            MemorySource::Entity,
        ];
        sources.sort();
        assert_eq!(
            sources,
            vec![
                MemorySource::ExactMatch,
                MemorySource::Semantic,
                MemorySource::Entity,
                MemorySource::Episodic,
            ]
        );
    }

    #[test]
    fn memory_source_serde_uses_kebab_case() {
        let json = serde_json::to_string(&MemorySource::ExactMatch).unwrap();
        assert_eq!(json, "\"exact-match\"");
    }
}
