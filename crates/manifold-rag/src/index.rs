// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector index with cosine top-k search.
//!
//! Every document carries an embedding of the index's fixed dimension;
//! a mismatched vector is rejected, never truncated or padded. Search is
//! a full scan, which is fine at the corpus sizes the orchestrator
//! ingests (thousands of chunks, not millions).

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use manifold_core::error::ManifoldError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Metadata predicate applied during search. Receives `None` for
/// documents stored without metadata.
pub type MetadataFilter = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Parameters for a similarity search.
pub struct SearchRequest {
    /// Maximum number of results.
    pub k: usize,
    /// Results scoring below this are discarded.
    pub min_score: f32,
    pub filter: Option<MetadataFilter>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            k: 5,
            min_score: 0.0,
            filter: None,
        }
    }
}

/// A document together with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Full-scan cosine similarity index over in-process documents.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    inner: RwLock<Vec<Document>>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Adds one document. Fails without mutating the index when the
    /// embedding dimension does not match.
    pub fn add(&self, document: Document) -> Result<(), ManifoldError> {
        self.check_dimension(&document)?;
        self.write().push(document);
        Ok(())
    }

    /// Adds a batch atomically: every document is validated before any
    /// is stored, so one bad embedding rejects the whole batch.
    pub fn add_batch(&self, documents: Vec<Document>) -> Result<usize, ManifoldError> {
        for document in &documents {
            self.check_dimension(document)?;
        }
        let added = documents.len();
        self.write().extend(documents);
        Ok(added)
    }

    /// Cosine top-k search over all stored documents.
    pub fn search(
        &self,
        query: &[f32],
        request: &SearchRequest,
    ) -> Result<Vec<ScoredDocument>, ManifoldError> {
        if query.len() != self.dimension {
            return Err(ManifoldError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let documents = self.read();
        let mut scored: Vec<ScoredDocument> = documents
            .iter()
            .filter_map(|document| {
                if let Some(filter) = &request.filter
                    && !filter(document.metadata.as_ref())
                {
                    return None;
                }
                let score = cosine_similarity(query, &document.embedding);
                (score >= request.min_score).then(|| ScoredDocument {
                    document: document.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(request.k);
        Ok(scored)
    }

    /// Serializes the index contents as a flat JSON array of documents.
    pub fn to_json(&self) -> Result<String, ManifoldError> {
        let documents = self.read();
        serde_json::to_string(&*documents).map_err(|error| ManifoldError::Serialization {
            message: "vector index could not be serialized".to_string(),
            source: Some(Box::new(error)),
        })
    }

    /// Rebuilds an index from [`VectorIndex::to_json`] output.
    ///
    /// Malformed JSON and wrong-dimension documents are hard errors, so a
    /// corrupt snapshot never yields a silently truncated index.
    pub fn from_json(dimension: usize, json: &str) -> Result<Self, ManifoldError> {
        let documents: Vec<Document> =
            serde_json::from_str(json).map_err(|error| ManifoldError::Serialization {
                message: "vector index snapshot could not be parsed".to_string(),
                source: Some(Box::new(error)),
            })?;

        let index = Self::new(dimension);
        index.add_batch(documents)?;
        Ok(index)
    }

    fn check_dimension(&self, document: &Document) -> Result<(), ManifoldError> {
        if document.embedding.len() != self.dimension {
            return Err(ManifoldError::DimensionMismatch {
                expected: self.dimension,
                actual: document.embedding.len(),
            });
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Document>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Document>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// A zero vector has no direction; similarity against it is 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vectors must have same length");
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
