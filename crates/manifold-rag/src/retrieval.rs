// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-to-context retrieval and message injection.
//!
//! `retrieve` embeds the query, searches the index, and formats the top
//! hits into a bounded context block. `inject_context` then places that
//! block into an outgoing message list as a system message, as an extra
//! user message, or inline in the last user message.

use manifold_core::error::ManifoldError;
use manifold_core::{ChatMessage, Role, approx_token_count};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingService;
use crate::index::{ScoredDocument, SearchRequest, VectorIndex};

/// Header line prepended to every injected context block.
const CONTEXT_HEADER: &str = "## Relevant Context\n";

/// Tuning knobs for [`retrieve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum number of documents to pull from the index.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Similarity floor below which documents are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Character budget for the formatted context block.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.7
}

fn default_max_context_length() -> usize {
    2000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_context_length: default_max_context_length(),
        }
    }
}

/// Where an injected context block lands in the message list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextFormat {
    /// A system message after any leading system prompts.
    #[default]
    System,
    /// A user message directly before the last user message.
    User,
    /// Prepended to the last user message's content.
    Inline,
}

/// The outcome of one retrieval pass.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub results: Vec<ScoredDocument>,
    pub formatted_context: String,
    pub approx_tokens: usize,
}

/// Embeds `query`, searches `index`, and formats the hits for injection.
pub async fn retrieve(
    query: &str,
    embeddings: &EmbeddingService,
    index: &VectorIndex,
    config: &RetrievalConfig,
) -> Result<Retrieval, ManifoldError> {
    let query_vector = embeddings.embed(query).await?;
    let results = index.search(
        &query_vector,
        &SearchRequest {
            k: config.top_k,
            min_score: config.min_score,
            filter: None,
        },
    )?;
    let formatted_context = format_context(&results, config.max_context_length);
    let approx_tokens = approx_token_count(&formatted_context);
    debug!(
        "retrieved {} documents (~{approx_tokens} tokens) for context injection",
        results.len()
    );
    Ok(Retrieval {
        results,
        formatted_context,
        approx_tokens,
    })
}

/// Formats results as numbered `[n] content (relevance: score)` lines.
///
/// Emission stops before the first line that would push the block past
/// `max_context_length` characters; a result is included whole or not
/// at all.
pub fn format_context(results: &[ScoredDocument], max_context_length: usize) -> String {
    let mut block = String::new();
    let mut used = 0usize;
    for (n, scored) in results.iter().enumerate() {
        let line = format!(
            "[{}] {} (relevance: {:.2})",
            n + 1,
            scored.document.content,
            scored.score
        );
        // Each line after the first costs one separator newline.
        let cost = line.chars().count() + usize::from(!block.is_empty());
        if used + cost > max_context_length {
            break;
        }
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(&line);
        used += cost;
    }
    block
}

/// Injects a formatted context block into a message list.
///
/// An empty context leaves the messages untouched.
pub fn inject_context(
    mut messages: Vec<ChatMessage>,
    context: &str,
    format: ContextFormat,
) -> Vec<ChatMessage> {
    if context.is_empty() {
        return messages;
    }

    let mut block = String::from(CONTEXT_HEADER);
    block.push_str(context);

    match format {
        ContextFormat::System => {
            let at = messages
                .iter()
                .take_while(|message| message.role == Role::System)
                .count();
            messages.insert(at, ChatMessage::system(block));
        }
        ContextFormat::User => match messages.iter().rposition(|m| m.role == Role::User) {
            Some(at) => messages.insert(at, ChatMessage::user(block)),
            None => messages.push(ChatMessage::user(block)),
        },
        ContextFormat::Inline => match messages.iter().rposition(|m| m.role == Role::User) {
            Some(at) => {
                let original = &messages[at].content;
                messages[at].content = format!("{block}\n\n{original}");
            }
            None => messages.push(ChatMessage::user(block)),
        },
    }

    messages
}
