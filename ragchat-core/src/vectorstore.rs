//! Vector index trait for storing and searching chunk embeddings.

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{DocumentChunk, IndexStats, SearchResult};
use crate::error::Result;

/// A storage backend for chunk vectors with cosine similarity search.
///
/// An index has one fixed dimension for its whole lifetime. It owns the
/// chunks it holds and hands out shared read-only handles. Writes are
/// atomic with respect to searches: a search sees either the state before a
/// write or the state after it, never a partial one.
///
/// Duplicate chunk ids follow last-write-wins. The replacement keeps the
/// insertion order of the chunk it overwrites, so re-inserting identical
/// chunks leaves search results unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_core::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(384);
/// index.insert_batch(chunks).await?;
/// let results = index.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The vector dimension every chunk and query must have.
    fn dimensions(&self) -> usize;

    /// Insert or overwrite a single chunk.
    async fn insert(&self, chunk: DocumentChunk) -> Result<Arc<DocumentChunk>>;

    /// Insert or overwrite a set of chunks, all or nothing.
    ///
    /// Every vector is validated before anything is published.
    async fn insert_batch(&self, chunks: Vec<DocumentChunk>) -> Result<Vec<Arc<DocumentChunk>>>;

    /// Atomically drop every chunk of `document_id` and publish `chunks`.
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Vec<Arc<DocumentChunk>>>;

    /// Return at most `top_k` chunks ordered by descending cosine similarity
    /// to `query`, ties broken by ascending insertion order.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Remove every chunk whose source is `document_id`, returning how many went.
    async fn remove_document(&self, document_id: &str) -> usize;

    /// Remove one chunk by id. Returns `false` if it was not present.
    async fn remove_chunk(&self, chunk_id: &str) -> bool;

    /// Look up a chunk by id.
    async fn get(&self, chunk_id: &str) -> Option<Arc<DocumentChunk>>;

    /// Number of chunks held.
    async fn len(&self) -> usize;

    /// Whether the index holds no chunks.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// IDs of the documents with at least one chunk, sorted.
    async fn document_ids(&self) -> Vec<String>;

    /// Drop every chunk.
    async fn clear(&self);

    /// Summary figures for monitoring.
    async fn stats(&self) -> IndexStats;
}
