//! # Document Chunker
//!
//! Splits long documents into model-context-sized pieces before they are
//! handed to the RAG Assembler or stored as evidence (§4.4). Splitting
//! follows a separator hierarchy — paragraphs, then lines, then sentences,
//! then words — falling back to a hard character split with overlap only
//! when no separator produces a small-enough piece.

use serde::{Deserialize, Serialize};
use tracing::debug;

const SEPARATOR_HIERARCHY: &[&str] =
    &["\n\n\n", "\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "];

/// Rough characters-per-token ratio used for the token estimate. The
/// teacher's stack carries no tokenizer crate, so this stays an estimate
/// rather than an exact count.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub max_chunk_size: usize,
    pub min_chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunks_per_doc: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 512,
            min_chunk_size: 100,
            chunk_overlap: 50,
            max_chunks_per_doc: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub estimated_tokens: usize,
}

pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / CHARS_PER_TOKEN).max(1)
}

/// Recursively splits `text` on the separator hierarchy, falling back to a
/// forced character split once no separator is left to try. Truncates to
/// `max_chunks_per_doc`, logging how many chunks were dropped.
pub fn chunk_document(text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let pieces = split_recursive(text, config, 0);
    let total = pieces.len();
    let truncated: Vec<String> = pieces.into_iter().take(config.max_chunks_per_doc).collect();
    if truncated.len() < total {
        debug!(
            dropped = total - truncated.len(),
            max = config.max_chunks_per_doc,
            "chunk_document truncated to max_chunks_per_doc"
        );
    }
    truncated
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let estimated_tokens = estimate_tokens(&text);
            Chunk { text, index, estimated_tokens }
        })
        .collect()
}

fn split_recursive(text: &str, config: &ChunkerConfig, separator_index: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.len() <= config.max_chunk_size {
        return vec![trimmed.to_string()];
    }

    let Some(separator) = SEPARATOR_HIERARCHY.get(separator_index) else {
        return force_split(trimmed, config);
    };

    let parts: Vec<&str> = trimmed.split(separator.as_ref() as &str).collect();
    if parts.len() <= 1 {
        return split_recursive(trimmed, config, separator_index + 1);
    }

    // Accumulate parts up to max_chunk_size; a piece that would tip the
    // running chunk over the limit is only kept if it already meets
    // min_chunk_size, otherwise it's dropped rather than shipped undersized.
    let mut chunks = Vec::new();
    let mut current = String::new();
    for part in parts {
        let candidate = if current.is_empty() { part.to_string() } else { format!("{current}{separator}{part}") };
        if candidate.len() <= config.max_chunk_size {
            current = candidate;
            continue;
        }

        if !current.is_empty() && estimate_tokens(&current) >= config.min_chunk_size {
            chunks.push(current.trim().to_string());
        }

        if part.len() > config.max_chunk_size {
            chunks.extend(split_recursive(part, config, separator_index + 1));
            current = String::new();
        } else {
            current = part.to_string();
        }
    }
    if !current.is_empty() && estimate_tokens(&current) >= config.min_chunk_size {
        chunks.push(current.trim().to_string());
    }
    chunks
}

/// Last-resort split on raw character boundaries, each piece overlapping the
/// previous by `chunk_overlap` characters so context isn't lost at the cut.
fn force_split(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let step = config.max_chunk_size.saturating_sub(config.chunk_overlap).max(1);
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        chunks.push(piece.trim().to_string());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}

/// Greedily packs chunks into a joined context string no longer than
/// `max_chars`, in order, stopping before the first chunk that would
/// overflow it.
pub fn fit_to_context(chunks: &[Chunk], max_chars: usize) -> String {
    let mut out = String::new();
    for chunk in chunks {
        let addition_len = if out.is_empty() { chunk.text.len() } else { out.len() + 2 + chunk.text.len() };
        if addition_len > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&chunk.text);
    }
    out
}

/// Chunks several documents concurrently, bounded by the number of CPUs
/// available to tokio's blocking pool. Mirrors the orchestrator's own
/// bounded-fan-out dispatch pattern.
pub async fn chunk_documents_parallel(documents: Vec<String>, config: ChunkerConfig) -> Vec<Vec<Chunk>> {
    let tasks: Vec<_> = documents
        .into_iter()
        .map(|doc| {
            let config = config.clone();
            tokio::task::spawn_blocking(move || chunk_document(&doc, &config))
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await.unwrap_or_default());
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let config = ChunkerConfig::default();
        let chunks = chunk_document("a short paragraph", &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a short paragraph");
    }

    #[test]
    fn long_text_splits_on_paragraph_boundaries() {
        let config = ChunkerConfig {
            max_chunk_size: 30,
            min_chunk_size: 3,
            chunk_overlap: 5,
            max_chunks_per_doc: 20,
        };
        let text = "first paragraph here\n\nsecond paragraph here\n\nthird paragraph here";
        let chunks = chunk_document(text, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= config.max_chunk_size + config.chunk_overlap);
            assert!(chunk.estimated_tokens >= config.min_chunk_size);
        }
    }

    #[test]
    fn pieces_below_min_chunk_size_are_dropped_rather_than_shipped_undersized() {
        let config = ChunkerConfig { max_chunk_size: 40, min_chunk_size: 3, chunk_overlap: 0, max_chunks_per_doc: 20 };
        // The trailing "ok" (2 chars -> 1 token) can't merge with the first
        // paragraph without exceeding max_chunk_size, and falls below
        // min_chunk_size on its own, so it should be dropped rather than
        // shipped as an undersized chunk.
        let text = "This is a long enough chunk of text.\n\nok";
        let chunks = chunk_document(text, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "This is a long enough chunk of text.");
        for chunk in &chunks {
            assert!(chunk.estimated_tokens >= config.min_chunk_size);
        }
    }

    #[test]
    fn force_split_overlaps_adjacent_pieces() {
        let config = ChunkerConfig {
            max_chunk_size: 10,
            min_chunk_size: 2,
            chunk_overlap: 3,
            max_chunks_per_doc: 20,
        };
        let text = "abcdefghijklmnopqrstuvwxyz";
        let pieces = force_split(text, &config);
        assert!(pieces.len() > 1);
        assert_eq!(pieces[0].len(), config.max_chunk_size);
    }

    #[test]
    fn max_chunks_per_doc_truncates() {
        let config = ChunkerConfig {
            max_chunk_size: 5,
            min_chunk_size: 1,
            chunk_overlap: 0,
            max_chunks_per_doc: 2,
        };
        let text = "a".repeat(200);
        let chunks = chunk_document(&text, &config);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn fit_to_context_stops_before_overflow() {
        let chunks = vec![
            Chunk { text: "12345".to_string(), index: 0, estimated_tokens: 2 },
            Chunk { text: "67890".to_string(), index: 1, estimated_tokens: 2 },
        ];
        let fitted = fit_to_context(&chunks, 5);
        assert_eq!(fitted, "12345");
    }
}
