//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. They must be deterministic: the same text always maps to the
/// same vector, and every vector has [`dimensions`](Self::dimensions)
/// entries. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Failures are reported as
/// [`RagError::EmbeddingUnavailable`](crate::RagError::EmbeddingUnavailable)
/// and are never retried here.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_core::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Output order matches input order. The default implementation calls
    /// [`embed`](EmbeddingProvider::embed) for each input and stops at the
    /// first failure.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Deterministic offline embeddings built by hashing words into buckets.
///
/// Each lowercase alphanumeric word adds a signed weight to one bucket, and
/// the result is L2-normalised. Texts sharing vocabulary land close together,
/// which is enough for demos and tests that must run without API keys. Text
/// without any words maps to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a provider producing vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn hash_word(word: &str) -> u64 {
        word.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = Self::hash_word(word);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            emb[bucket] += sign;
        }

        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
