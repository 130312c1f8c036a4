//! Request and response shapes for a chat turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::SearchResult;

/// Characters of chunk text included in a [`SourceRef`] preview.
const PREVIEW_CHARS: usize = 200;

fn default_use_rag() -> bool {
    true
}

/// A user message to send through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Session to continue. A new session is created when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Whether to retrieve document context for this turn.
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
}

impl ChatRequest {
    /// A retrieval-augmented request in a new session.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), session_id: None, use_rag: true }
    }

    /// Continue an existing session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Turn document retrieval on or off for this turn.
    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }
}

/// A retrieved chunk cited in a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// ID of the cited chunk.
    pub chunk_id: String,
    /// ID of the document the chunk came from.
    pub document_id: String,
    /// Display name of the document, if known.
    pub source_name: Option<String>,
    /// Similarity between the query and the chunk.
    pub score: f32,
    /// Leading part of the chunk text, suffixed with `...` when cut.
    pub preview: String,
}

impl From<&SearchResult> for SourceRef {
    fn from(result: &SearchResult) -> Self {
        let chunk = &result.chunk;
        let mut preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
        if chunk.text.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            source_name: chunk.source_name.clone(),
            score: result.score,
            preview,
        }
    }
}

/// The assistant's reply to a [`ChatRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    /// Session the turn was recorded in.
    pub session_id: String,
    /// The assistant's reply.
    pub response: String,
    /// Chunks that were placed in the model context.
    pub sources: Vec<SourceRef>,
    /// When the reply was produced.
    pub timestamp: DateTime<Utc>,
}
