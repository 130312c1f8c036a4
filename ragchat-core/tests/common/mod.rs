//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragchat_core::{
    CompletionProvider, ContextPayload, DocumentChunk, EmbeddingProvider, RagError, Result,
};
use tokio::sync::Mutex;

/// A chunk with the given vector and no text offsets of interest.
pub fn chunk(id: &str, document_id: &str, vector: Vec<f32>) -> DocumentChunk {
    DocumentChunk {
        id: id.to_string(),
        document_id: document_id.to_string(),
        source_name: None,
        text: format!("text of {id}"),
        start_offset: 0,
        end_offset: 10,
        vector,
        insertion_order: 0,
    }
}

/// Replies with a numbered echo of the query and records every payload.
#[derive(Default)]
pub struct RecordingLlm {
    pub payloads: Mutex<Vec<ContextPayload>>,
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for RecordingLlm {
    async fn complete(&self, payload: &ContextPayload) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().await.push(payload.clone());
        Ok(format!("reply {n} to: {}", payload.query))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Always fails like an unreachable model endpoint.
pub struct FailingLlm;

#[async_trait]
impl CompletionProvider for FailingLlm {
    async fn complete(&self, _payload: &ContextPayload) -> Result<String> {
        Err(RagError::LlmUnavailable {
            provider: "failing".to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Sleeps before answering, so tests can cancel or overlap turns.
///
/// Records the history length each call was given.
pub struct SlowLlm {
    pub delay: Duration,
    pub history_lens: Mutex<Vec<usize>>,
}

impl SlowLlm {
    pub fn new(delay: Duration) -> Self {
        Self { delay, history_lens: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl CompletionProvider for SlowLlm {
    async fn complete(&self, payload: &ContextPayload) -> Result<String> {
        self.history_lens.lock().await.push(payload.history.len());
        tokio::time::sleep(self.delay).await;
        Ok(format!("slow reply to: {}", payload.query))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Embeds like the wrapped provider until told to fail.
pub struct FlakyEmbedder {
    pub inner: Arc<dyn EmbeddingProvider>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl FlakyEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self { inner, fail: std::sync::atomic::AtomicBool::new(false) }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingUnavailable {
                provider: "flaky".to_string(),
                message: "model not loaded".to_string(),
            });
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Returns one vector fewer than asked for from every batch.
pub struct ShortBatchEmbedder {
    pub inner: Arc<dyn EmbeddingProvider>,
}

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = self.inner.embed_batch(texts).await?;
        vectors.pop();
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}
