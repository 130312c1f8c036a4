//! Document chunking strategies.
//!
//! This module provides the [`chunk_spans`] sliding window, the [`Chunker`]
//! trait, and two implementations:
//!
//! - [`FixedSizeChunker`]: windows of `size` characters, consecutive windows
//!   sharing exactly `overlap` characters
//! - [`SentenceChunker`]: the same window, pulled back to the last sentence or
//!   word boundary when one is close to the end
//!
//! All offsets count characters, so multi-byte text never splits inside a
//! code point.

use std::iter::FusedIterator;

use crate::config::RagConfig;
use crate::document::{Document, DocumentChunk};
use crate::error::{RagError, Result};

/// A window over the source text, with character offsets `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    /// The covered text.
    pub text: &'a str,
    /// First character of the span.
    pub start: usize,
    /// One past the last character of the span.
    pub end: usize,
}

/// Lazy iterator over overlapping fixed-size windows of a text.
///
/// Window *i* starts at character `i * (size - overlap)`; the last window is
/// the first one that reaches the end of the text and may be shorter than
/// `size`. The iterator is `Clone`; a clone taken before iteration replays
/// the whole sequence.
#[derive(Debug, Clone)]
pub struct ChunkSpans<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    byte_pos: usize,
    char_pos: usize,
    done: bool,
}

/// Split `text` into windows of `size` characters overlapping by `overlap`.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`] unless `size > 0` and
/// `overlap < size`.
///
/// # Example
///
/// ```
/// use ragchat_core::chunking::chunk_spans;
///
/// let spans: Vec<_> = chunk_spans("abcdefghij", 5, 2).unwrap().collect();
/// assert_eq!(spans.len(), 3);
/// assert_eq!(spans[1].text, "defgh");
/// assert_eq!((spans[2].start, spans[2].end), (6, 10));
/// ```
pub fn chunk_spans(text: &str, size: usize, overlap: usize) -> Result<ChunkSpans<'_>> {
    validate_window(size, overlap)?;
    Ok(ChunkSpans { text, size, step: size - overlap, byte_pos: 0, char_pos: 0, done: false })
}

fn validate_window(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(RagError::InvalidConfiguration(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    if overlap >= size {
        return Err(RagError::InvalidConfiguration(format!(
            "chunk overlap ({overlap}) must be less than chunk size ({size})"
        )));
    }
    Ok(())
}

/// Byte length and character count of the first `n` characters of `s`.
fn advance(s: &str, n: usize) -> (usize, usize) {
    match s.char_indices().nth(n) {
        Some((byte_idx, _)) => (byte_idx, n),
        None => (s.len(), s.chars().count()),
    }
}

impl<'a> Iterator for ChunkSpans<'a> {
    type Item = TextSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.byte_pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.byte_pos..];
        let (window_bytes, window_chars) = advance(rest, self.size);
        let span = TextSpan {
            text: &rest[..window_bytes],
            start: self.char_pos,
            end: self.char_pos + window_chars,
        };

        if window_bytes == rest.len() {
            self.done = true;
        } else {
            let (step_bytes, step_chars) = advance(rest, self.step);
            self.byte_pos += step_bytes;
            self.char_pos += step_chars;
        }

        Some(span)
    }
}

impl FusedIterator for ChunkSpans<'_> {}

/// Expected number of windows for a text of `len` characters.
///
/// `ceil((len - overlap) / (size - overlap))` when `len > overlap`, one window
/// for shorter non-empty text and none for empty text.
pub fn expected_chunk_count(len: usize, size: usize, overlap: usize) -> usize {
    if len == 0 {
        0
    } else if len <= overlap {
        1
    } else {
        (len - overlap).div_ceil(size - overlap)
    }
}

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`DocumentChunk`]s with text and offsets but no
/// vectors. Vectors are attached later by the pipeline, and the insertion
/// order is stamped by the index.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<DocumentChunk>;
}

fn new_chunk(
    document: &Document,
    index: usize,
    text: &str,
    start: usize,
    end: usize,
) -> DocumentChunk {
    DocumentChunk {
        id: format!("{}_{index}", document.id),
        document_id: document.id.clone(),
        source_name: document.source_name.clone(),
        text: text.to_string(),
        start_offset: start,
        end_offset: end,
        vector: Vec::new(),
        insertion_order: 0,
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`.
///
/// # Example
///
/// ```
/// use ragchat_core::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(20, 5).unwrap();
/// let chunks = chunker.chunk(&Document::new("sky", "The sky is blue. Grass is green."));
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[1].id, "sky_1");
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] unless
    /// `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker using the sizes from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<DocumentChunk> {
        let Ok(spans) = chunk_spans(&document.text, self.chunk_size, self.chunk_overlap) else {
            return Vec::new();
        };

        spans
            .enumerate()
            .map(|(index, span)| new_chunk(document, index, span.text, span.start, span.end))
            .collect()
    }
}

/// Fraction of the window a boundary must lie beyond to be used as the cut.
const BOUNDARY_THRESHOLD: f64 = 0.7;

/// Splits text into windows that prefer to end on sentence boundaries.
///
/// Each window of `chunk_size` characters is cut after the last `.`, `!` or
/// `?` when that lies beyond 70% of the window, otherwise before the last
/// space beyond 70%, otherwise at the full width. The next window starts
/// `chunk_overlap` characters before the cut. Chunk text is trimmed of
/// surrounding whitespace, with offsets adjusted to match, and blank chunks
/// are skipped.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] unless
    /// `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Character position (relative to the window start) to cut the window at.
    fn cut_point(&self, window: &[char]) -> usize {
        let threshold = self.chunk_size as f64 * BOUNDARY_THRESHOLD;

        if let Some(pos) = window.iter().rposition(|c| matches!(c, '.' | '!' | '?')) {
            if pos as f64 > threshold {
                return pos + 1;
            }
        }
        if let Some(pos) = window.iter().rposition(|c| *c == ' ') {
            if pos as f64 > threshold {
                return pos;
            }
        }
        window.len()
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document) -> Vec<DocumentChunk> {
        let chars: Vec<char> = document.text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let mut end = (start + self.chunk_size).min(total);
            if end < total {
                end = start + self.cut_point(&chars[start..end]);
            }

            let raw = &chars[start..end];
            let lead = raw.iter().take_while(|c| c.is_whitespace()).count();
            let trail = raw[lead..].iter().rev().take_while(|c| c.is_whitespace()).count();
            if lead < raw.len() {
                let text: String = raw[lead..raw.len() - trail].iter().collect();
                chunks.push(new_chunk(
                    document,
                    chunks.len(),
                    &text,
                    start + lead,
                    end - trail,
                ));
            }

            if end >= total {
                break;
            }
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}
