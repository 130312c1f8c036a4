//! Completion provider trait for the external language model.

use async_trait::async_trait;

use crate::context::ContextPayload;
use crate::error::Result;

/// Instructions given to the model on every turn.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with access to a knowledge base through RAG (Retrieval-Augmented Generation).

When responding to users:
1. Use the provided context from the knowledge base when relevant
2. If the context contains relevant information, reference it naturally in your response
3. If the context doesn't contain relevant information, respond based on your general knowledge
4. Be concise but helpful
5. If you're unsure about something, acknowledge it honestly
6. Always maintain a friendly and professional tone

When context is provided, integrate it naturally into your response without explicitly mentioning \"based on the provided context\" unless specifically asked about your sources.";

/// A text-completion capability reached over the network.
///
/// The provider receives the assembled [`ContextPayload`] and returns the
/// assistant's reply. Failures are reported as
/// [`RagError::LlmUnavailable`](crate::RagError::LlmUnavailable); retries,
/// if any, belong to the caller.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_core::CompletionProvider;
///
/// let reply = provider.complete(&payload).await?;
/// ```
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the assistant reply for a payload.
    async fn complete(&self, payload: &ContextPayload) -> Result<String>;

    /// Short name used in logs and errors.
    fn name(&self) -> &str;
}
