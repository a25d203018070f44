//! Deterministic overlapping text windows for map-reduce summarization.

use crate::pipeline::gateway::approx_token_count;

/// One bounded, possibly overlapping window of a larger document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub approx_tokens: usize,
    /// Byte offset of this window in the source text. Non-decreasing
    /// across the chunk list.
    pub start_offset: usize,
}

/// Split `text` into windows of `max_tokens * 4` characters with
/// `overlap_tokens * 4` characters shared between consecutive windows.
///
/// The step back for overlap saturates at zero so a short tail can never
/// produce a negative start. All boundaries are snapped down to char
/// boundaries; the union of windows covers the whole text.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let window = max_tokens.saturating_mul(4).max(1);
    let overlap = overlap_tokens.saturating_mul(4).min(window - 1);
    let total = text.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < total {
        let mut end = snap_to_char_boundary(text, (start + window).min(total));
        if end <= start {
            end = next_char_boundary(text, start + 1);
        }
        let slice = &text[start..end];
        chunks.push(Chunk {
            index,
            text: slice.to_string(),
            approx_tokens: approx_token_count(slice) as usize,
            start_offset: start,
        });
        if end == total {
            break;
        }
        let mut next = snap_to_char_boundary(text, end.saturating_sub(overlap));
        if next <= start {
            // Overlap would stall; continue without it.
            next = end;
        }
        start = next;
        index += 1;
    }
    chunks
}

/// Largest char boundary not beyond `index`.
fn snap_to_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index -= 1;
    }
    index.min(text.len())
}

/// Smallest char boundary at or above `index`.
fn next_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}
