//! Sliding-window text chunker.
//!
//! Splits parsed document text into overlapping fixed-size windows over
//! character positions. Windows advance by `size - overlap` characters, so
//! the geometry invariant `overlap < size` keeps the loop moving; it is
//! validated here and again at knowledge-base create/update.

use platform::{PlatformError, Result};

/// One positioned window of source text.
///
/// `start`/`end` are character offsets into the parsed content, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based order within the document
    pub index: usize,
    pub content: String,
    pub start: usize,
    pub end: usize,
    /// Estimated tokens, ceil(chars / 4)
    pub token_estimate: usize,
}

/// Estimate the token count of a text as ceil(chars / 4).
///
/// A deliberate approximation; close enough for cost accounting and window
/// sizing without pulling in a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Split `content` into overlapping windows of `size` characters.
///
/// Window `i` spans `[pos, pos + size)` clipped at the content length; the
/// next window starts at `pos + size - overlap`. The walk stops once a window
/// reaches the end of the content, so the tail is never re-emitted. Operates
/// on characters, not bytes, so multi-byte text cannot split a code point.
///
/// Empty content yields no chunks. `size == 0` and `overlap >= size` are
/// rejected as validation errors.
pub fn chunk_text(content: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if size == 0 {
        return Err(PlatformError::validation("chunk_size must be positive"));
    }
    if overlap >= size {
        return Err(PlatformError::validation(
            "chunk_overlap must be less than chunk_size",
        ));
    }

    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut pos = 0;
    let mut index = 0;

    while pos < len {
        let end = usize::min(pos + size, len);
        let window: String = chars[pos..end].iter().collect();

        chunks.push(Chunk {
            index,
            token_estimate: estimate_tokens(&window),
            content: window,
            start: pos,
            end,
        });

        if end == len {
            break;
        }
        pos += size - overlap;
        index += 1;
    }

    Ok(chunks)
}
