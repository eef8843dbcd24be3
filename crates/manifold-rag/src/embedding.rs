// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache-aside embedding service.
//!
//! The cache is injected, bounded, and keyed by
//! `(provider, model, text)` so vectors from different embedding spaces
//! never collide. Eviction is oldest-inserted-first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use manifold_core::error::ManifoldError;
use manifold_core::traits::Embedder;

type CacheKey = (String, String, String);

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<CacheKey, Vec<f32>>,
    /// Insertion order; the front is the next eviction victim.
    order: VecDeque<CacheKey>,
}

/// Bounded embedding cache with insertion-order eviction.
#[derive(Debug)]
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl EmbeddingCache {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, provider: &str, model: &str, text: &str) -> Option<Vec<f32>> {
        let inner = self.lock();
        inner
            .map
            .get(&(provider.to_string(), model.to_string(), text.to_string()))
            .cloned()
    }

    pub fn put(&self, provider: &str, model: &str, text: &str, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let key = (provider.to_string(), model.to_string(), text.to_string());
        let mut inner = self.lock();
        if inner.map.insert(key.clone(), vector).is_none() {
            inner.order.push_back(key);
            if inner.order.len() > self.capacity
                && let Some(oldest) = inner.order.pop_front()
            {
                inner.map.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Embeds text through an [`Embedder`], consulting the cache first.
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self { embedder, cache }
    }

    /// The cache shared by this service.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Embeds one text, cache-aside.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ManifoldError> {
        let (provider, model) = (self.embedder.provider(), self.embedder.model());
        if let Some(vector) = self.cache.get(provider, model, text) {
            return Ok(vector);
        }

        let output = self.embedder.embed(&[text.to_string()]).await?;
        let vector = output
            .into_iter()
            .next()
            .ok_or_else(|| ManifoldError::Internal("embedder returned no vector".to_string()))?;
        self.cache
            .put(self.embedder.provider(), self.embedder.model(), text, vector.clone());
        Ok(vector)
    }

    /// Embeds a batch, issuing a single provider call for the texts the
    /// cache does not already hold. Output order matches input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ManifoldError> {
        let (provider, model) = (self.embedder.provider(), self.embedder.model());
        let mut resolved: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.cache.get(provider, model, text))
            .collect();

        let missing: Vec<usize> = resolved
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_none().then_some(i))
            .collect();

        if !missing.is_empty() {
            let inputs: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.embedder.embed(&inputs).await?;
            if fresh.len() != inputs.len() {
                return Err(ManifoldError::Internal(format!(
                    "embedder returned {} vectors for {} inputs",
                    fresh.len(),
                    inputs.len()
                )));
            }
            let (provider, model) = (self.embedder.provider(), self.embedder.model());
            for (&i, vector) in missing.iter().zip(fresh) {
                self.cache.put(provider, model, &texts[i], vector.clone());
                resolved[i] = Some(vector);
            }
        }

        resolved
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    ManifoldError::Internal("embedding batch left an unresolved slot".to_string())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use manifold_test_utils::MockEmbedder;

    use super::*;

    fn service(cache: EmbeddingCache) -> (Arc<MockEmbedder>, EmbeddingService) {
        let embedder = Arc::new(MockEmbedder::new());
        let service = EmbeddingService::new(embedder.clone(), Arc::new(cache));
        (embedder, service)
    }

    #[tokio::test]
    async fn repeat_embeds_hit_the_cache() {
        let (embedder, service) = service(EmbeddingCache::new());

        let first = service.embed("hello world").await.unwrap();
        let second = service.embed("hello world").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls(), 1, "second embed should be a cache hit");
    }

    #[tokio::test]
    async fn batch_only_fetches_uncached_texts() {
        let (embedder, service) = service(EmbeddingCache::new());
        service.embed("alpha").await.unwrap();

        let texts: Vec<String> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = service.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(
            embedder.embedded_texts().await,
            vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()],
            "the batch call should only have carried beta and gamma"
        );
        assert_eq!(embedder.calls(), 2);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &embedder.vector_for(text), "order must be preserved");
        }
    }

    #[tokio::test]
    async fn fully_cached_batch_makes_no_provider_call() {
        let (embedder, service) = service(EmbeddingCache::new());
        service.embed("a").await.unwrap();
        service.embed("b").await.unwrap();

        let vectors = service
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(embedder.calls(), 2, "batch should be served from cache");
    }

    #[tokio::test]
    async fn eviction_is_oldest_first() {
        let (embedder, service) = service(EmbeddingCache::with_capacity(2));

        service.embed("one").await.unwrap();
        service.embed("two").await.unwrap();
        service.embed("three").await.unwrap();
        // "one" was evicted; this misses and re-embeds.
        service.embed("one").await.unwrap();

        assert_eq!(embedder.calls(), 4);
        // "three" is still resident.
        service.embed("three").await.unwrap();
        assert_eq!(embedder.calls(), 4);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let (embedder, service) = service(EmbeddingCache::new());
        service.embed("text").await.unwrap();
        assert_eq!(service.cache().len(), 1);

        service.cache().clear();
        assert!(service.cache().is_empty());

        service.embed("text").await.unwrap();
        assert_eq!(embedder.calls(), 2);
    }

    #[test]
    fn keys_separate_embedding_spaces() {
        let cache = EmbeddingCache::new();
        cache.put("p1", "m", "text", vec![1.0]);

        assert_eq!(cache.get("p1", "m", "text"), Some(vec![1.0]));
        assert_eq!(cache.get("p2", "m", "text"), None);
        assert_eq!(cache.get("p1", "other", "text"), None);
    }

    #[test]
    fn overwrite_does_not_grow_the_order_queue() {
        let cache = EmbeddingCache::with_capacity(2);
        cache.put("p", "m", "a", vec![1.0]);
        cache.put("p", "m", "a", vec![2.0]);
        cache.put("p", "m", "b", vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("p", "m", "a"), Some(vec![2.0]));
        assert_eq!(cache.get("p", "m", "b"), Some(vec![3.0]));
    }
}
