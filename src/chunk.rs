//! Fixed-size overlapping window chunker.
//!
//! Splits extracted document text into windows of `chunk_size` characters,
//! each starting `chunk_size - chunk_overlap` characters after the previous
//! one. Windows are counted in Unicode scalar values, so multi-byte text is
//! never split inside a character.
//!
//! Parameters are validated once, when [`ChunkParams`] is constructed, so an
//! overlap that would stall or reverse the window can never reach
//! [`chunk_text`].

use crate::error::{RagError, Result};

/// Validated chunking parameters: `chunk_size > 0` and
/// `chunk_overlap < chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::config("chunking.chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            size: chunk_size,
            overlap: chunk_overlap,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between window starts. Always >= 1.
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }
}

/// Split `text` into overlapping windows, in order.
///
/// Produces `text[i..i + size]` for `i = 0, step, 2 * step, ...` while
/// `i < len(text)`; the final windows are clipped to the end of the text.
/// Empty input yields no chunks.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<String> {
    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::with_capacity(char_len.div_ceil(params.step()));
    let mut start = 0;
    while start < char_len {
        let end = (start + params.size).min(char_len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        start += params.step();
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(size, overlap).unwrap()
    }

    #[test]
    fn test_windows_step_by_size_minus_overlap() {
        let chunks = chunk_text("abcdefghij", &params(4, 1));
        assert_eq!(chunks, vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &params(4, 1)).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(chunk_text("abc", &params(10, 2)), vec!["abc"]);
    }

    #[test]
    fn test_no_overlap() {
        assert_eq!(chunk_text("abcdef", &params(2, 0)), vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn test_chunk_count_matches_ceil() {
        let text: String = "lorem ipsum dolor sit amet ".repeat(40);
        for (size, overlap) in [(1, 0), (7, 3), (50, 10), (64, 63), (500, 100), (2000, 5)] {
            let p = params(size, overlap);
            let expected = text.chars().count().div_ceil(p.step());
            assert_eq!(chunk_text(&text, &p).len(), expected, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let text: String = ('a'..='z').cycle().take(300).collect();
        let p = params(40, 12);
        let chunks = chunk_text(&text, &p);
        for pair in chunks.windows(2) {
            if pair[1].chars().count() < p.overlap() {
                continue;
            }
            let tail: String = pair[0].chars().skip(p.size() - p.overlap()).collect();
            let head: String = pair[1].chars().take(p.overlap()).collect();
            assert_eq!(tail, head);
        }
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let chunks = chunk_text("héllo wörld ✓✓", &params(5, 1));
        assert_eq!(chunks[0], "héllo");
        assert_eq!(chunks[1], "o wör");
        assert_eq!(chunks[2], "rld ✓");
        assert_eq!(chunks.last().map(String::as_str), Some("✓✓"));
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(ChunkParams::new(4, 4), Err(RagError::Configuration(_))));
        assert!(matches!(ChunkParams::new(4, 9), Err(RagError::Configuration(_))));
        assert!(matches!(ChunkParams::new(0, 0), Err(RagError::Configuration(_))));
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha Beta Gamma Delta Epsilon";
        assert_eq!(chunk_text(text, &params(8, 2)), chunk_text(text, &params(8, 2)));
    }
}
