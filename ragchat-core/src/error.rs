//! Error types for the `ragchat-core` crate.

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking, budget or pipeline parameters are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A vector's length disagrees with the index dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension fixed for the index.
        expected: usize,
        /// The length of the offending vector.
        actual: usize,
    },

    /// The document has no text content once whitespace is ignored.
    #[error("Document '{document_id}' has no text content")]
    EmptyDocument {
        /// The ID of the rejected document.
        document_id: String,
    },

    /// The query text is empty or whitespace only.
    #[error("Query must not be empty")]
    EmptyQuery,

    /// The embedding capability could not be reached or returned garbage.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model could not be reached or returned no text.
    #[error("LLM unavailable ({provider}): {message}")]
    LlmUnavailable {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Publishing would grow the index past its configured bound.
    #[error("Capacity exceeded: index holds at most {limit} chunks, {requested} requested")]
    CapacityExceeded {
        /// The configured chunk limit.
        limit: usize,
        /// The chunk count the rejected write would have produced.
        requested: usize,
    },
}

impl RagError {
    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn llm(provider: &str, message: impl Into<String>) -> Self {
        Self::LlmUnavailable { provider: provider.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
