//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-converse workflow by
//! composing an [`EmbeddingProvider`], a [`VectorIndex`], a [`Chunker`], a
//! [`CompletionProvider`] and a [`ConversationStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_core::{RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .completion_provider(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest_document("handbook", &text).await?;
//! let reply = pipeline.converse("session-1", "What is the leave policy?").await?;
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::chat::{ChatRequest, ChatResponse, SourceRef};
use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::context::ContextPayload;
use crate::conversation::{resolve_session_id, ConversationMessage, ConversationStore};
use crate::document::{Document, DocumentChunk, IndexStats, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorIndex;
use crate::llm::CompletionProvider;
use crate::vectorstore::VectorIndex;

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (chunk → embed → publish) and chat turns
/// (embed → search → window history → assemble → complete → record).
/// Construct one via [`RagPipeline::builder()`]. The pipeline is meant to be
/// built once at startup and shared behind an `Arc`; all state lives in
/// memory for the lifetime of the process.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    chunker: Arc<dyn Chunker>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
    conversations: ConversationStore,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Return a reference to the conversation store.
    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Ingest raw text under `document_id`, returning the number of chunks created.
    ///
    /// # Errors
    ///
    /// See [`ingest`](Self::ingest).
    pub async fn ingest_document(&self, document_id: &str, raw_text: &str) -> Result<usize> {
        let chunks = self.ingest(&Document::new(document_id, raw_text)).await?;
        Ok(chunks.len())
    }

    /// Ingest a single document: chunk → embed → publish.
    ///
    /// Any chunks previously stored for the same document id are replaced in
    /// the same write, so a search never sees a mix of old and new chunks.
    /// Returns the published chunks.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyDocument`] if the text is empty or whitespace only
    /// - [`RagError::EmbeddingUnavailable`] if embedding fails
    /// - [`RagError::DimensionMismatch`] or [`RagError::CapacityExceeded`]
    ///   if the index rejects the chunks
    ///
    /// On error the index is left exactly as it was.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<Arc<DocumentChunk>>> {
        if document.text.trim().is_empty() {
            return Err(RagError::EmptyDocument { document_id: document.id.clone() });
        }

        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument { document_id: document.id.clone() });
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            e
        })?;

        if embeddings.len() != chunks.len() {
            error!(
                document.id = %document.id,
                expected = chunks.len(),
                actual = embeddings.len(),
                "embedding batch size mismatch"
            );
            return Err(RagError::embedding(
                "pipeline",
                format!(
                    "received {} embeddings for {} chunks of document '{}'",
                    embeddings.len(),
                    chunks.len(),
                    document.id
                ),
            ));
        }

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.vector = embedding;
        }

        let published =
            self.vector_index.replace_document(&document.id, chunks).await.map_err(|e| {
                error!(document.id = %document.id, error = %e, "publish failed during ingestion");
                e
            })?;

        info!(document.id = %document.id, chunk_count = published.len(), "ingested document");
        Ok(published)
    }

    /// Ingest multiple documents, stopping at the first failure.
    ///
    /// Documents before the failing one stay ingested; the failing one
    /// leaves no chunks behind.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<Vec<Arc<DocumentChunk>>> {
        let mut all_chunks = Vec::new();
        for document in documents {
            all_chunks.extend(self.ingest(document).await?);
        }
        Ok(all_chunks)
    }

    /// Remove every chunk of a document, returning how many were removed.
    pub async fn remove_document(&self, document_id: &str) -> usize {
        let removed = self.vector_index.remove_document(document_id).await;
        info!(document.id = document_id, removed, "removed document");
        removed
    }

    /// Retrieve chunks for a query: embed → search → filter by threshold.
    ///
    /// Returns at most `top_k` results ordered by descending score.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyQuery`] for blank input and propagates
    /// embedding or index failures.
    pub async fn query(&self, query: &str) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let query_embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let results = self.vector_index.search(&query_embedding, self.config.top_k).await?;

        let threshold = self.config.similarity_threshold;
        let filtered: Vec<SearchResult> =
            results.into_iter().filter(|r| r.score >= threshold).collect();

        debug!(result_count = filtered.len(), "query completed");
        Ok(filtered)
    }

    /// Run one chat turn and return the assistant's reply text.
    ///
    /// # Errors
    ///
    /// See [`chat`](Self::chat).
    pub async fn converse(&self, session_id: &str, user_text: &str) -> Result<String> {
        let request = ChatRequest::new(user_text).with_session(session_id);
        Ok(self.chat(request).await?.response)
    }

    /// Run one chat turn.
    ///
    /// Turns on the same session run one at a time; other sessions are not
    /// blocked. The user message and the reply are recorded together, only
    /// after the model has answered. If any step fails, or the future is
    /// dropped before the reply arrives, the session history is unchanged
    /// and a session that did not exist is not created.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuery`] for a blank message
    /// - [`RagError::EmbeddingUnavailable`] if the query cannot be embedded
    /// - [`RagError::LlmUnavailable`] if no completion provider is configured
    ///   or the model call fails
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.message.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let session_id = resolve_session_id(request.session_id.as_deref());
        let _turn = self.conversations.lock_session(&session_id).await;
        let user_message = ConversationMessage::user(&session_id, request.message.as_str());

        let retrieved = if request.use_rag { self.query(&request.message).await? } else { Vec::new() };
        let history =
            self.conversations.recent_window(&session_id, self.config.context_window_size).await;
        let payload = ContextPayload::assemble(
            retrieved,
            history,
            request.message.as_str(),
            self.config.max_context_chars,
        );

        let provider = self
            .completion_provider
            .as_ref()
            .ok_or_else(|| RagError::llm("none", "no completion provider configured"))?;

        let response = provider.complete(&payload).await.map_err(|e| {
            error!(session.id = %session_id, provider = provider.name(), error = %e, "completion failed");
            e
        })?;

        let assistant_message = ConversationMessage::assistant(&session_id, response.as_str());
        self.conversations.append_turn(&session_id, user_message, assistant_message).await;

        info!(
            session.id = %session_id,
            retrieved = payload.retrieved.len(),
            history = payload.history.len(),
            trimmed_history = payload.trimmed_history,
            "chat turn completed"
        );

        Ok(ChatResponse {
            session_id,
            response,
            sources: payload.retrieved.iter().map(SourceRef::from).collect(),
            timestamp: Utc::now(),
        })
    }

    /// Summary figures of the vector index.
    pub async fn stats(&self) -> IndexStats {
        self.vector_index.stats().await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config` and `embedding_provider` are required. The vector index
/// defaults to an [`InMemoryVectorIndex`] sized to the provider, the chunker
/// to a [`FixedSizeChunker`] using the configured sizes, and the
/// conversation store to a fresh one using the configured retention. Without
/// a completion provider the pipeline can ingest and query but not chat.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_index(Arc::new(index))          // optional
///     .chunker(Arc::new(chunker))             // optional
///     .completion_provider(Arc::new(llm))     // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
    conversations: Option<ConversationStore>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the language model used for chat turns.
    pub fn completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Share an existing conversation store.
    pub fn conversation_store(mut self, store: ConversationStore) -> Self {
        self.conversations = Some(store);
        self
    }

    /// Build the [`RagPipeline`], validating that the parts fit together.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if a required field is
    /// missing, the config is inconsistent, or the embedding dimension
    /// disagrees with the index or with `config.embedding_dimension`.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self
            .config
            .ok_or_else(|| RagError::InvalidConfiguration("config is required".to_string()))?;
        config.validate()?;

        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::InvalidConfiguration("embedding_provider is required".to_string())
        })?;
        let dimensions = embedding_provider.dimensions();

        if let Some(expected) = config.embedding_dimension {
            if expected != dimensions {
                return Err(RagError::InvalidConfiguration(format!(
                    "embedding provider produces {dimensions} dimensions, config expects {expected}"
                )));
            }
        }

        let vector_index = match self.vector_index {
            Some(index) => index,
            None => {
                let index = InMemoryVectorIndex::new(dimensions);
                let index = match config.max_chunks {
                    Some(limit) => index.with_max_chunks(limit),
                    None => index,
                };
                Arc::new(index) as Arc<dyn VectorIndex>
            }
        };
        if vector_index.dimensions() != dimensions {
            return Err(RagError::InvalidConfiguration(format!(
                "vector index expects {} dimensions, embedding provider produces {dimensions}",
                vector_index.dimensions()
            )));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::from_config(&config)?) as Arc<dyn Chunker>,
        };

        let conversations =
            self.conversations.unwrap_or_else(|| ConversationStore::from_config(&config));

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_index,
            chunker,
            completion_provider: self.completion_provider,
            conversations,
        })
    }
}
