// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Working tier: keyed context values with scored eviction.
//!
//! Capacity pressure evicts the entry with the lowest
//! `importance_weight * (access_count + 1)` product, so frequently read
//! entries outlive important-but-untouched ones. Expiry is lazy: both
//! `set` and `get` sweep before doing their work.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{Importance, MemoryEntry, MemoryKind};

/// Sizing knobs for the working tier.
#[derive(Debug, Clone, Copy)]
pub struct WorkingOptions {
    pub capacity: usize,
    pub ttl: chrono::Duration,
}

impl Default for WorkingOptions {
    fn default() -> Self {
        Self {
            capacity: 50,
            ttl: chrono::Duration::hours(2),
        }
    }
}

/// Caller-supplied extras for [`WorkingMemory::set`].
#[derive(Debug, Clone, Default)]
pub struct ContextMeta {
    pub importance: Option<Importance>,
    pub metadata: Option<Value>,
}

/// Keyed context store. Not internally synchronized; the manager wraps
/// it in a mutex.
#[derive(Debug, Default)]
pub struct WorkingMemory {
    options: WorkingOptions,
    entries: HashMap<String, MemoryEntry>,
}

impl WorkingMemory {
    pub fn new(options: WorkingOptions) -> Self {
        Self {
            options,
            entries: HashMap::new(),
        }
    }

    /// Inserts or overwrites a keyed value.
    ///
    /// Overwrites never trigger eviction; only a genuinely new key at
    /// capacity evicts the lowest-scored entry.
    pub fn set(&mut self, key: &str, value: Value, meta: Option<ContextMeta>) {
        let now = Utc::now();
        self.sweep(now);

        if !self.entries.contains_key(key) && self.entries.len() >= self.options.capacity {
            self.evict_lowest();
        }

        let meta = meta.unwrap_or_default();
        let mut entry = MemoryEntry::new(MemoryKind::Context, value);
        entry.importance = meta.importance.unwrap_or_default();
        entry.metadata = meta.metadata;
        entry.expires_at = Some(entry.created_at + self.options.ttl);
        self.entries.insert(key.to_string(), entry);
    }

    /// Returns the stored value and bumps the entry's access metadata.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = Utc::now();
        self.sweep(now);

        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed_at = Some(now);
        Some(entry.content.clone())
    }

    /// Live entries keyed by context key. Callers must skip expired
    /// entries themselves; this does not sweep.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MemoryEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn evict_lowest(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                score(a)
                    .total_cmp(&score(b))
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            tracing::debug!(key = %key, "working memory full, evicting lowest-scored entry");
            self.entries.remove(&key);
        }
    }
}

fn score(entry: &MemoryEntry) -> f64 {
    entry.importance.weight() * f64::from(entry.access_count + 1)
}
