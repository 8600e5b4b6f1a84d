//! Paragraph-boundary text chunker.
//!
//! Splits document text on blank-line boundaries (any whitespace run that
//! contains two or more newlines) into paragraph units. Each non-empty
//! unit, trimmed, becomes one chunk. Offsets are character positions into
//! the original text, so `text.chars().skip(start).take(end - start)`
//! reproduces the chunk content exactly.
//!
//! Chunking is a pure function: identical input always yields an
//! identical span sequence. Chunk IDs are assigned afterwards by
//! [`into_chunks`], which is the only non-deterministic step.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// A chunk candidate before it is assigned an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub content: String,
    pub start: usize,
    pub end: usize,
}

/// Split text into paragraph spans.
///
/// Units whose trimmed length is below `min_chars` are dropped
/// (`min_chars = 1` drops only whitespace-only units). Text with no
/// blank-line boundary yields a single span covering the trimmed text.
pub fn split_paragraphs(text: &str, min_chars: usize) -> Vec<ChunkSpan> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();

    for (unit_start, unit_end) in paragraph_units(&chars) {
        let mut start = unit_start;
        let mut end = unit_end;
        while start < end && chars[start].is_whitespace() {
            start += 1;
        }
        while end > start && chars[end - 1].is_whitespace() {
            end -= 1;
        }

        let len = end - start;
        if len == 0 || len < min_chars {
            continue;
        }

        spans.push(ChunkSpan {
            index: spans.len(),
            content: chars[start..end].iter().collect(),
            start,
            end,
        });
    }

    spans
}

/// Character ranges between blank-line separators, untrimmed.
fn paragraph_units(chars: &[char]) -> Vec<(usize, usize)> {
    let mut units = Vec::new();
    let mut unit_start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let run_start = i;
        let mut newlines = 0;
        while i < chars.len() && chars[i].is_whitespace() {
            if chars[i] == '\n' {
                newlines += 1;
            }
            i += 1;
        }

        if newlines >= 2 {
            units.push((unit_start, run_start));
            unit_start = i;
        }
    }
    units.push((unit_start, chars.len()));

    units
}

/// Assign fresh IDs and content hashes to spans for the given document.
pub fn into_chunks(document_id: &str, spans: Vec<ChunkSpan>) -> Vec<Chunk> {
    spans
        .into_iter()
        .map(|span| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: span.index as i64,
            hash: hash_text(&span.content),
            content: span.content,
            start_offset: span.start as i64,
            end_offset: span.end as i64,
            embedding: None,
        })
        .collect()
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
