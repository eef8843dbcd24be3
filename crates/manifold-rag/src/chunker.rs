// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunking for document ingestion.
//!
//! Splits on a separator (blank line by default), accumulates pieces up
//! to a target size, and carries a character overlap from each chunk's
//! tail into the next so retrieval never loses context at a boundary.
//! The markdown variant additionally treats `#` header lines as hard
//! boundaries and records the active header in each chunk's metadata.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Chunking knobs. Sizes and overlap are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_separator() -> String {
    "\n\n".to_string()
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separator: default_separator(),
        }
    }
}

/// Where a chunk came from and where it sits in the source text.
///
/// `start_char`/`end_char` index the unduplicated span: concatenating
/// the spans of all chunks reconstructs the original text exactly. The
/// overlap prefix is part of `content` but never part of the span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_char: usize,
    pub end_char: usize,
    /// Active markdown header, if the markdown chunker produced this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

/// One piece of a split document, ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Splits `text` into overlapping chunks on the configured separator.
///
/// Pieces accumulate until adding the next one would exceed
/// `chunk_size`; the finished chunk's trailing `chunk_overlap`
/// characters (bounded at its own length) become the next chunk's
/// prefix. A single piece larger than `chunk_size` still becomes one
/// chunk: the separator is the finest split granularity.
pub fn chunk_text(source_id: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    assemble(source_id, text, config, false)
}

/// Markdown-aware variant of [`chunk_text`].
///
/// Lines starting with `#` force a chunk boundary, suppress the overlap
/// carry (sections start clean), and set the active header recorded in
/// the metadata of every chunk up to the next header.
pub fn chunk_markdown(source_id: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    assemble(source_id, text, config, true)
}

/// One separator-delimited piece of the source, with both byte and
/// char coordinates. Bytes slice the source, chars feed the metadata.
struct Segment {
    bytes: Range<usize>,
    chars: Range<usize>,
    header: Option<String>,
    hard: bool,
}

/// An open chunk being accumulated.
struct Draft {
    start_byte: usize,
    end_byte: usize,
    start_char: usize,
    end_char: usize,
    prefix: String,
    header: Option<String>,
}

fn assemble(source_id: &str, text: &str, config: &ChunkConfig, markdown: bool) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let segments = split_segments(text, &config.separator, markdown);

    // content, span start, header
    let mut finished: Vec<(String, usize, Option<String>)> = Vec::new();
    let mut current: Option<Draft> = None;
    let mut carry = String::new();
    let mut active_header: Option<String> = None;

    for segment in &segments {
        if segment.hard {
            if let Some(draft) = current.take() {
                finish(draft, text, &mut finished);
            }
            // Hard boundaries start clean: no overlap bleed across sections.
            carry.clear();
            active_header = segment.header.clone();
        }

        let fits = match &current {
            Some(draft) => {
                draft.prefix.chars().count() + (segment.chars.end - draft.start_char)
                    <= config.chunk_size
            }
            None => true,
        };
        if !fits && let Some(draft) = current.take() {
            carry = finish(draft, text, &mut finished);
            truncate_to_tail(&mut carry, config.chunk_overlap);
        }

        match &mut current {
            Some(draft) => {
                draft.end_byte = segment.bytes.end;
                draft.end_char = segment.chars.end;
            }
            None => {
                current = Some(Draft {
                    start_byte: segment.bytes.start,
                    end_byte: segment.bytes.end,
                    start_char: segment.chars.start,
                    end_char: segment.chars.end,
                    prefix: std::mem::take(&mut carry),
                    header: active_header.clone(),
                });
            }
        }
    }
    if let Some(draft) = current.take() {
        finish(draft, text, &mut finished);
    }

    let total_chunks = finished.len();
    let total_chars = text.chars().count();
    let mut chunks = Vec::with_capacity(total_chunks);
    for (index, (content, start_char, header)) in finished.iter().enumerate() {
        // Chunk 0 owns any leading separator so the spans tile the text.
        let start_char = if index == 0 { 0 } else { *start_char };
        let end_char = finished
            .get(index + 1)
            .map_or(total_chars, |(_, next_start, _)| *next_start);
        chunks.push(Chunk {
            id: format!("{source_id}:{index}"),
            content: content.clone(),
            metadata: ChunkMetadata {
                source_id: source_id.to_string(),
                chunk_index: index,
                total_chunks,
                start_char,
                end_char,
                header: header.clone(),
            },
        });
    }
    chunks
}

/// Closes a draft: builds its content and records it. Returns the full
/// content so the caller can derive the next chunk's overlap prefix.
fn finish(draft: Draft, text: &str, finished: &mut Vec<(String, usize, Option<String>)>) -> String {
    let content = format!("{}{}", draft.prefix, &text[draft.start_byte..draft.end_byte]);
    finished.push((content.clone(), draft.start_char, draft.header));
    content
}

/// Keeps only the last `n` characters of `s`.
fn truncate_to_tail(s: &mut String, n: usize) {
    if n == 0 {
        s.clear();
        return;
    }
    let count = s.chars().count();
    if count <= n {
        return;
    }
    let cut = s
        .char_indices()
        .nth(count - n)
        .map_or(0, |(byte_idx, _)| byte_idx);
    s.drain(..cut);
}

fn split_segments(text: &str, separator: &str, markdown: bool) -> Vec<Segment> {
    let sep_bytes = separator.len();
    let sep_chars = separator.chars().count();
    let mut segments = Vec::new();
    let mut byte_pos = 0;
    let mut char_pos = 0;
    for (i, piece) in text.split(separator).enumerate() {
        if i > 0 {
            byte_pos += sep_bytes;
            char_pos += sep_chars;
        }
        let piece_chars = piece.chars().count();
        if !piece.is_empty() {
            if markdown {
                push_markdown_segments(piece, byte_pos, char_pos, &mut segments);
            } else {
                segments.push(Segment {
                    bytes: byte_pos..byte_pos + piece.len(),
                    chars: char_pos..char_pos + piece_chars,
                    header: None,
                    hard: false,
                });
            }
        }
        byte_pos += piece.len();
        char_pos += piece_chars;
    }
    segments
}

/// Sub-splits one piece at interior `#` header lines.
fn push_markdown_segments(
    piece: &str,
    base_byte: usize,
    base_char: usize,
    segments: &mut Vec<Segment>,
) {
    // (byte, char) offsets within the piece where sub-segments begin.
    let mut cuts: Vec<(usize, usize)> = vec![(0, 0)];
    let mut byte_off = 0;
    let mut char_off = 0;
    for line in piece.split_inclusive('\n') {
        if byte_off > 0 && line.starts_with('#') {
            cuts.push((byte_off, char_off));
        }
        byte_off += line.len();
        char_off += line.chars().count();
    }
    cuts.push((piece.len(), char_off));

    for window in cuts.windows(2) {
        let (start_byte, start_char) = window[0];
        let (end_byte, end_char) = window[1];
        if start_byte == end_byte {
            continue;
        }
        let slice = &piece[start_byte..end_byte];
        let hard = slice.starts_with('#');
        let header = if hard {
            slice
                .lines()
                .next()
                .map(|line| line.trim_start_matches('#').trim().to_string())
        } else {
            None
        };
        segments.push(Segment {
            bytes: base_byte + start_byte..base_byte + end_byte,
            chars: base_char + start_char..base_char + end_char,
            header,
            hard,
        });
    }
}
