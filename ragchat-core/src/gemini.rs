//! Gemini embedding and completion providers using the Gemini REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::context::ContextPayload;
use crate::conversation::Role;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{CompletionProvider, DEFAULT_SYSTEM_PROMPT};

/// The Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default model for embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// The dimensionality of `text-embedding-004`.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// The default model for chat completions.
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// Maximum requests accepted by one `batchEmbedContents` call.
const MAX_BATCH_SIZE: usize = 100;

const PROVIDER: &str = "Gemini";

/// Embedding task for search queries.
const QUERY_TASK: &str = "RETRIEVAL_QUERY";
/// Embedding task for chunks stored in the index.
const DOCUMENT_TASK: &str = "RETRIEVAL_DOCUMENT";

fn api_key_from_env() -> std::result::Result<String, String> {
    std::env::var("GEMINI_API_KEY")
        .map_err(|_| "GEMINI_API_KEY environment variable not set".to_string())
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self { role: role.map(str::to_string), parts: vec![Part { text: text.into() }] }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Concatenated text of the first candidate, if it has any.
fn first_candidate_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

/// Thin HTTP client shared by both providers.
#[derive(Clone)]
struct GeminiHttp {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiHttp {
    fn new(api_key: String) -> std::result::Result<Self, String> {
        if api_key.is_empty() {
            return Err("API key must not be empty".to_string());
        }
        Ok(Self { client: reqwest::Client::new(), api_key, base_url: DEFAULT_BASE_URL.into() })
    }

    /// POST a JSON body to `models/{model}:{method}`, mapping failures to
    /// strings the caller wraps in its own error variant.
    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        let url = format!("{}/models/{model}:{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(format!("API returned {status}: {detail}"));
        }

        response.json::<R>().await.map_err(|e| format!("failed to parse response: {e}"))
    }
}

/// An [`EmbeddingProvider`] backed by the Gemini embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-004`.
/// - `dimensions` – optional output dimensionality override.
/// - `api_key` – from the constructor or the `GEMINI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_core::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    http: GeminiHttp,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl GeminiEmbeddingProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = GeminiHttp::new(api_key.into()).map_err(|m| RagError::embedding(PROVIDER, m))?;
        Ok(Self {
            http,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env().map_err(|m| RagError::embedding(PROVIDER, m))?)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask the API to truncate vectors to `dims` entries.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Point the provider at another endpoint, such as a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http.base_url = base_url.into();
        self
    }

    fn request(&self, text: &str, task_type: &'static str) -> EmbedContentRequest {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content::text(None, text),
            task_type,
            output_dimensionality: self.request_dimensions,
        }
    }

    fn check(&self, vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.len() != self.dimensions {
            return Err(RagError::embedding(
                PROVIDER,
                format!("expected {} dimensions, got {}", self.dimensions, vector.len()),
            ));
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let body = self.request(text, QUERY_TASK);
        let response: EmbedContentResponse =
            self.http.call(&self.model, "embedContent", &body).await.map_err(|m| {
                error!(provider = PROVIDER, error = %m, "embedding request failed");
                RagError::embedding(PROVIDER, m)
            })?;
        self.check(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            debug!(provider = PROVIDER, batch_size = batch.len(), model = %self.model, "embedding batch");

            let requests = batch.iter().map(|t| self.request(t, DOCUMENT_TASK)).collect();
            let body = BatchEmbedRequest { requests };
            let response: BatchEmbedResponse = self
                .http
                .call(&self.model, "batchEmbedContents", &body)
                .await
                .map_err(|m| {
                    error!(provider = PROVIDER, error = %m, "batch embedding request failed");
                    RagError::embedding(PROVIDER, m)
                })?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::embedding(
                    PROVIDER,
                    format!(
                        "API returned {} embeddings for {} inputs",
                        response.embeddings.len(),
                        batch.len()
                    ),
                ));
            }
            for values in response.embeddings {
                results.push(self.check(values.values)?);
            }
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`CompletionProvider`] backed by Gemini `generateContent`.
///
/// History turns map to `user`/`model` contents; the knowledge-base block
/// is prefixed to the final user turn.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_core::gemini::GeminiCompletionProvider;
///
/// let llm = GeminiCompletionProvider::from_env()?.with_temperature(0.2);
/// ```
pub struct GeminiCompletionProvider {
    http: GeminiHttp,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiCompletionProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = GeminiHttp::new(api_key.into()).map_err(|m| RagError::llm(PROVIDER, m))?;
        Ok(Self {
            http,
            model: DEFAULT_CHAT_MODEL.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: 0.7,
            max_output_tokens: 1000,
        })
    }

    /// Create a new provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env().map_err(|m| RagError::llm(PROVIDER, m))?)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Replace the system instructions.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the reply length in tokens.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Point the provider at another endpoint, such as a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http.base_url = base_url.into();
        self
    }

    fn request(&self, payload: &ContextPayload) -> GenerateContentRequest {
        let mut contents: Vec<Content> = payload
            .history
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Content::text(Some(role), m.text.as_str())
            })
            .collect();
        contents.push(Content::text(Some("user"), payload.user_prompt()));

        GenerateContentRequest {
            contents,
            system_instruction: Content::text(None, self.system_prompt.as_str()),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiCompletionProvider {
    async fn complete(&self, payload: &ContextPayload) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            history = payload.history.len(),
            retrieved = payload.retrieved.len(),
            "generating content"
        );

        let response: GenerateContentResponse = self
            .http
            .call(&self.model, "generateContent", &self.request(payload))
            .await
            .map_err(|m| {
                error!(provider = PROVIDER, error = %m, "generateContent failed");
                RagError::llm(PROVIDER, m)
            })?;

        first_candidate_text(response)
            .ok_or_else(|| RagError::llm(PROVIDER, "response contained no text"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
