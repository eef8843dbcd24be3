// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-term tier: the rolling conversation transcript.
//!
//! An append-only list of turns, capped by message count and TTL. The
//! first message is pinned when it is a system prompt: capacity pruning
//! and TTL sweeps drop the oldest non-system turns, never the prompt.

use chrono::{DateTime, Utc};
use manifold_core::types::{ChatMessage, Role};
use serde_json::{Value, json};

use crate::types::{MemoryEntry, MemoryKind};

/// Sizing knobs for the short-term tier.
#[derive(Debug, Clone, Copy)]
pub struct ShortTermOptions {
    /// Most recent turns retained, not counting a pinned system prompt.
    pub max_messages: usize,
    /// Turns older than this are swept on the next mutation.
    pub ttl: chrono::Duration,
}

impl Default for ShortTermOptions {
    fn default() -> Self {
        Self {
            max_messages: 20,
            ttl: chrono::Duration::hours(1),
        }
    }
}

/// A conversation snapshot taken for episode creation.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub messages: Vec<ChatMessage>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// The rolling transcript. Not internally synchronized; the manager
/// wraps it in a mutex.
#[derive(Debug, Default)]
pub struct ShortTermMemory {
    options: ShortTermOptions,
    entries: Vec<MemoryEntry>,
}

impl ShortTermMemory {
    pub fn new(options: ShortTermOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
        }
    }

    /// Appends one turn and returns its entry id.
    ///
    /// Expired turns are swept first, then the capacity rule is applied:
    /// keep the pinned system prompt (if any) plus the most recent
    /// `max_messages` turns.
    pub fn add_message(&mut self, role: Role, content: &str) -> String {
        let now = Utc::now();
        self.sweep(now);

        let mut entry = MemoryEntry::new(
            MemoryKind::Message,
            json!({ "role": role, "content": content }),
        );
        entry.expires_at = Some(entry.created_at + self.options.ttl);
        let id = entry.id.clone();
        self.entries.push(entry);

        self.enforce_capacity();
        id
    }

    /// Live turns decoded back into chat messages, oldest first.
    pub fn history(&mut self) -> Vec<ChatMessage> {
        self.sweep(Utc::now());
        self.entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.content.clone()).ok())
            .collect()
    }

    /// Snapshot of the live conversation with its first/last timestamps.
    pub fn snapshot(&mut self) -> ConversationSnapshot {
        self.sweep(Utc::now());
        ConversationSnapshot {
            messages: self
                .entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.content.clone()).ok())
                .collect(),
            started_at: self.entries.first().map(|entry| entry.created_at),
            ended_at: self.entries.last().map(|entry| entry.created_at),
        }
    }

    /// Raw entries, for tier-spanning scans. Callers must skip expired
    /// entries themselves; this does not sweep.
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops expired turns. The pinned system prompt is immune.
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let pinned = self
            .entries
            .first()
            .filter(|entry| is_system(entry))
            .map(|entry| entry.id.clone());
        self.entries
            .retain(|entry| pinned.as_deref() == Some(entry.id.as_str()) || !entry.is_expired(now));
        before - self.entries.len()
    }

    fn enforce_capacity(&mut self) {
        let pinned = self.entries.first().is_some_and(is_system);
        let cap = if pinned {
            self.options.max_messages + 1
        } else {
            self.options.max_messages
        };
        if self.entries.len() <= cap {
            return;
        }
        let excess = self.entries.len() - cap;
        let from = usize::from(pinned);
        self.entries.drain(from..from + excess);
    }
}

fn is_system(entry: &MemoryEntry) -> bool {
    entry.content.get("role").and_then(Value::as_str) == Some("system")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ShortTermMemory {
        ShortTermMemory::new(ShortTermOptions {
            max_messages: 3,
            ..ShortTermOptions::default()
        })
    }

    #[test]
    fn history_round_trips_roles_and_content() {
        let mut tier = ShortTermMemory::default();
        tier.add_message(Role::System, "be brief");
        tier.add_message(Role::User, "hello");
        tier.add_message(Role::Assistant, "hi");

        let history = tier.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], ChatMessage::system("be brief"));
        assert_eq!(history[1], ChatMessage::user("hello"));
        assert_eq!(history[2], ChatMessage::assistant("hi"));
    }

    #[test]
    fn system_prompt_survives_capacity_pruning() {
        let mut tier = small();
        tier.add_message(Role::System, "prompt");
        for i in 0..6 {
            tier.add_message(Role::User, &format!("turn {i}"));
        }

        let history = tier.history();
        assert_eq!(history.len(), 4, "system prompt plus max_messages turns");
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[1].content, "turn 3");
        assert_eq!(history[3].content, "turn 5");
    }

    #[test]
    fn capacity_without_system_prompt_keeps_most_recent() {
        let mut tier = small();
        for i in 0..5 {
            tier.add_message(Role::User, &format!("turn {i}"));
        }

        let history = tier.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "turn 2");
        assert_eq!(history[2].content, "turn 4");
    }

    #[test]
    fn sweep_drops_expired_turns_but_not_the_prompt() {
        let mut tier = ShortTermMemory::default();
        tier.add_message(Role::System, "prompt");
        tier.add_message(Role::User, "old");

        let swept = tier.sweep(Utc::now() + chrono::Duration::hours(2));
        assert_eq!(swept, 1);
        let history = tier.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
    }

    #[test]
    fn snapshot_carries_boundary_timestamps() {
        let mut tier = ShortTermMemory::default();
        assert!(tier.snapshot().started_at.is_none());

        tier.add_message(Role::User, "first");
        tier.add_message(Role::Assistant, "second");

        let snapshot = tier.snapshot();
        assert_eq!(snapshot.messages.len(), 2);
        let (start, end) = (snapshot.started_at.unwrap(), snapshot.ended_at.unwrap());
        assert!(start <= end);
    }
}
