//! Data types for documents, chunks, and search results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A source document holding raw text extracted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Display name of the original source, such as the uploaded file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

impl Document {
    /// Create a document without a source name.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), source_name: None }
    }

    /// Attach the name of the file or URL the text came from.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

/// A segment of a [`Document`] with its vector embedding.
///
/// Offsets count characters, not bytes, and form the half-open range
/// `start_offset..end_offset` of the parent text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    /// Unique identifier for the chunk, `{document_id}_{chunk_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Display name inherited from the parent document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// The text content of the chunk.
    pub text: String,
    /// First character of the chunk in the parent text.
    pub start_offset: usize,
    /// One past the last character of the chunk in the parent text.
    pub end_offset: usize,
    /// The vector embedding for this chunk's text.
    pub vector: Vec<f32>,
    /// Position in which the index first published this chunk id.
    pub insertion_order: u64,
}

impl DocumentChunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Name shown to the model when citing this chunk.
    pub fn display_source(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.document_id)
    }
}

/// A retrieved [`DocumentChunk`] paired with a relevance score.
///
/// The chunk is shared with the index, so results stay valid even if the
/// document is removed while the caller still holds them.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Arc<DocumentChunk>,
    /// The cosine similarity score (higher is more relevant).
    pub score: f32,
}

/// Aggregate figures describing the contents of a vector index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    /// Number of chunks held.
    pub total_chunks: usize,
    /// Number of distinct source documents.
    pub total_documents: usize,
    /// Fixed vector dimension of the index.
    pub dimension: usize,
    /// Rough size of vectors plus chunk text, in bytes.
    pub estimated_memory_bytes: usize,
}
