//! In-memory vector index using cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], a brute-force index backed
//! by a `HashMap` protected by a `tokio::sync::RwLock`. Searches share the
//! read lock and scan every entry; writes validate first and then publish
//! under a single write lock, so readers never observe half a document.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{DocumentChunk, IndexStats, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorIndex;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude, so the result is never
/// NaN for finite input.
///
/// ```
/// use ragchat_core::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
/// assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Descending score, then ascending insertion order.
fn rank(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score.total_cmp(&a.score).then(a.chunk.insertion_order.cmp(&b.chunk.insertion_order))
}

#[derive(Debug, Default)]
struct IndexState {
    chunks: HashMap<String, Arc<DocumentChunk>>,
    documents: HashMap<String, HashSet<String>>,
    next_order: u64,
}

impl IndexState {
    fn detach(&mut self, chunk_id: &str) -> Option<Arc<DocumentChunk>> {
        let chunk = self.chunks.remove(chunk_id)?;
        if let Some(ids) = self.documents.get_mut(&chunk.document_id) {
            ids.remove(chunk_id);
            if ids.is_empty() {
                self.documents.remove(&chunk.document_id);
            }
        }
        Some(chunk)
    }

    fn drop_document(&mut self, document_id: &str) -> Vec<Arc<DocumentChunk>> {
        let Some(ids) = self.documents.remove(document_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.chunks.remove(id)).collect()
    }

    /// Publish one chunk, reusing `order` when it replaces an earlier entry.
    fn publish(&mut self, mut chunk: DocumentChunk, order: Option<u64>) -> Arc<DocumentChunk> {
        chunk.insertion_order = order.unwrap_or_else(|| {
            let next = self.next_order;
            self.next_order += 1;
            next
        });
        let chunk = Arc::new(chunk);
        self.documents.entry(chunk.document_id.clone()).or_default().insert(chunk.id.clone());
        self.chunks.insert(chunk.id.clone(), Arc::clone(&chunk));
        chunk
    }
}

/// An in-memory vector index using cosine similarity for search.
///
/// All operations are async-safe via `tokio::sync::RwLock`. The optional
/// chunk limit bounds memory use; writes that would exceed it are rejected
/// whole.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_core::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(768).with_max_chunks(100_000);
/// index.insert(chunk).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimensions: usize,
    max_chunks: Option<usize>,
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create a new empty index for vectors of `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, max_chunks: None, state: RwLock::new(IndexState::default()) }
    }

    /// Reject writes that would leave more than `limit` chunks in the index.
    pub fn with_max_chunks(mut self, limit: usize) -> Self {
        self.max_chunks = Some(limit);
        self
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Validate, then apply an optional document removal and the inserts as
    /// one write.
    async fn write(
        &self,
        replacing: Option<&str>,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Vec<Arc<DocumentChunk>>> {
        for chunk in &chunks {
            self.check_dimensions(&chunk.vector)?;
        }

        let mut state = self.state.write().await;

        let removed: HashSet<&str> = replacing
            .and_then(|doc| state.documents.get(doc))
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default();

        if let Some(limit) = self.max_chunks {
            let mut incoming: HashSet<&str> = HashSet::new();
            let mut added = 0;
            for chunk in &chunks {
                let id = chunk.id.as_str();
                let survives = state.chunks.contains_key(id) && !removed.contains(id);
                if incoming.insert(id) && !survives {
                    added += 1;
                }
            }
            let requested = state.chunks.len() - removed.len() + added;
            if requested > limit {
                return Err(RagError::CapacityExceeded { limit, requested });
            }
        }

        let previous_orders: HashMap<String, u64> = chunks
            .iter()
            .filter_map(|c| state.chunks.get(&c.id).map(|old| (c.id.clone(), old.insertion_order)))
            .collect();

        if let Some(document_id) = replacing {
            let dropped = state.drop_document(document_id);
            debug!(document.id = document_id, dropped = dropped.len(), "replacing document");
        }

        let mut published = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let order = previous_orders.get(&chunk.id).copied();
            state.detach(&chunk.id);
            published.push(state.publish(chunk, order));
        }
        Ok(published)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn insert(&self, chunk: DocumentChunk) -> Result<Arc<DocumentChunk>> {
        self.check_dimensions(&chunk.vector)?;
        let mut state = self.state.write().await;

        let order = state.chunks.get(&chunk.id).map(|old| old.insertion_order);
        if let (None, Some(limit)) = (order, self.max_chunks) {
            if state.chunks.len() >= limit {
                return Err(RagError::CapacityExceeded {
                    limit,
                    requested: state.chunks.len() + 1,
                });
            }
        }

        state.detach(&chunk.id);
        Ok(state.publish(chunk, order))
    }

    async fn insert_batch(&self, chunks: Vec<DocumentChunk>) -> Result<Vec<Arc<DocumentChunk>>> {
        self.write(None, chunks).await
    }

    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Vec<Arc<DocumentChunk>>> {
        self.write(Some(document_id), chunks).await
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.check_dimensions(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut scored: Vec<SearchResult> = state
            .chunks
            .values()
            .map(|chunk| SearchResult {
                score: cosine_similarity(&chunk.vector, query),
                chunk: Arc::clone(chunk),
            })
            .collect();
        drop(state);

        if scored.len() > top_k {
            scored.select_nth_unstable_by(top_k - 1, rank);
            scored.truncate(top_k);
        }
        scored.sort_by(rank);
        Ok(scored)
    }

    async fn remove_document(&self, document_id: &str) -> usize {
        let removed = self.state.write().await.drop_document(document_id).len();
        debug!(document.id = document_id, removed, "removed document chunks");
        removed
    }

    async fn remove_chunk(&self, chunk_id: &str) -> bool {
        self.state.write().await.detach(chunk_id).is_some()
    }

    async fn get(&self, chunk_id: &str) -> Option<Arc<DocumentChunk>> {
        self.state.read().await.chunks.get(chunk_id).cloned()
    }

    async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    async fn document_ids(&self) -> Vec<String> {
        let state = self.state.read().await;
        let ids: BTreeSet<&String> = state.documents.keys().collect();
        ids.into_iter().cloned().collect()
    }

    async fn clear(&self) {
        let mut state = self.state.write().await;
        state.chunks.clear();
        state.documents.clear();
    }

    async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        let estimated_memory_bytes = state
            .chunks
            .values()
            .map(|c| c.vector.len() * std::mem::size_of::<f32>() + c.text.len())
            .sum();
        IndexStats {
            total_chunks: state.chunks.len(),
            total_documents: state.documents.len(),
            dimension: self.dimensions,
            estimated_memory_bytes,
        }
    }
}
