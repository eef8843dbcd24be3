// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-augmented generation pipeline for Manifold.
//!
//! ## Architecture
//!
//! - **chunker**: splits documents into bounded, overlapping chunks,
//!   with a markdown-aware variant that respects header boundaries
//! - **embedding**: cache-aside embedding service over any `Embedder`,
//!   keyed by `(provider, model, text)` with bounded eviction
//! - **index**: in-memory vector index with cosine top-k search,
//!   metadata filtering, and JSON snapshot persistence
//! - **retrieval**: query-to-context orchestration, turning index hits
//!   into a bounded context block injected into outgoing messages

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod retrieval;

pub use chunker::{Chunk, ChunkConfig, ChunkMetadata, chunk_markdown, chunk_text};
pub use embedding::{EmbeddingCache, EmbeddingService};
pub use index::{
    Document, MetadataFilter, ScoredDocument, SearchRequest, VectorIndex, cosine_similarity,
};
pub use retrieval::{
    ContextFormat, Retrieval, RetrievalConfig, format_context, inject_context, retrieve,
};
