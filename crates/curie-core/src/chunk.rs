//! Line-respecting text chunker.
//!
//! Splits extracted document text into segments of at most `max_chars`
//! characters without ever breaking a line. Lines are accumulated greedily;
//! when the next line (plus its newline) would overflow the budget, the
//! buffer is flushed as a chunk. A single line longer than the budget
//! becomes a chunk on its own.
//!
//! Lengths are counted in `char`s, not bytes.
//!
//! # Example
//!
//! ```rust
//! use curie_core::chunk::split_text;
//!
//! let chunks = split_text("alpha\nbeta\ngamma", 11);
//! assert_eq!(chunks, vec!["alpha\nbeta", "gamma"]);
//! ```

use uuid::Uuid;

use crate::models::Chunk;

/// Default chunk budget in characters.
pub const DEFAULT_MAX_CHARS: usize = 1200;

/// Stored in place of a chunk whose text is empty after NUL stripping.
pub const EMPTY_CHUNK_PLACEHOLDER: &str = "[empty chunk]";

/// Split `text` into trimmed, non-empty chunks of whole lines.
///
/// Joining the returned chunks with `\n` reproduces the input's lines
/// (modulo whitespace at chunk edges).
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut count = 0usize;

    for line in text.lines() {
        let len = line.chars().count();
        if count + len + 1 > max_chars {
            out.push(buf.join("\n").trim().to_string());
            buf.clear();
            count = 0;
        }
        buf.push(line);
        count += len + 1;
    }
    if !buf.is_empty() {
        out.push(buf.join("\n").trim().to_string());
    }

    out.retain(|c| !c.is_empty());
    out
}

/// Split `text` into [`Chunk`]s owned by `document_id`, with contiguous
/// indices starting at 0 and no embeddings attached.
pub fn chunk_text(document_id: &str, text: &str, max_chars: usize) -> Vec<Chunk> {
    split_text(text, max_chars)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: i as i64,
            text,
            embedding: None,
        })
        .collect()
}

/// Strip NUL bytes so the text can be persisted.
///
/// Returns the cleaned text and whether anything was removed. Text that is
/// empty after stripping is replaced by [`EMPTY_CHUNK_PLACEHOLDER`].
pub fn sanitize_chunk_text(text: &str) -> (String, bool) {
    if !text.contains('\0') {
        return (text.to_string(), false);
    }
    let cleaned: String = text.chars().filter(|&c| c != '\0').collect();
    if cleaned.trim().is_empty() {
        (EMPTY_CHUNK_PLACEHOLDER.to_string(), true)
    } else {
        (cleaned, true)
    }
}
