//! Configuration for the RAG pipeline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of recent conversation messages sent with each turn.
    pub context_window_size: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Upper bound on the rendered context payload, in characters.
    pub max_context_chars: usize,
    /// Messages retained per session. `None` keeps twice the context window.
    pub history_retention: Option<usize>,
    /// Expected embedding dimension. Checked against the provider when set.
    pub embedding_dimension: Option<usize>,
    /// Maximum number of chunks the vector index may hold.
    pub max_chunks: Option<usize>,
    /// Maximum number of live sessions before the stalest one is evicted.
    pub max_sessions: Option<usize>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            context_window_size: 10,
            top_k: 4,
            similarity_threshold: 0.0,
            max_context_chars: 12_000,
            history_retention: None,
            embedding_dimension: None,
            max_chunks: None,
            max_sessions: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load the defaults overlaid with `RAGCHAT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if a variable does not parse
    /// or the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = RagConfig::builder();
        let config = &mut builder.config;

        if let Some(v) = parse_var(&lookup, "RAGCHAT_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGCHAT_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGCHAT_CONTEXT_WINDOW")? {
            config.context_window_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGCHAT_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGCHAT_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGCHAT_MAX_CONTEXT_CHARS")? {
            config.max_context_chars = v;
        }
        config.max_chunks = parse_var(&lookup, "RAGCHAT_MAX_CHUNKS")?;
        config.max_sessions = parse_var(&lookup, "RAGCHAT_MAX_SESSIONS")?;

        builder.build()
    }

    /// Messages each session keeps in memory.
    pub fn effective_history_retention(&self) -> usize {
        self.history_retention.unwrap_or(self.context_window_size * 2)
    }

    /// Check that the parameters are consistent with each other.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `context_window_size` or `max_context_chars` is zero
    /// - the history retention is smaller than the context window
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.context_window_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "context_window_size must be greater than zero".to_string(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::InvalidConfiguration(
                "max_context_chars must be greater than zero".to_string(),
            ));
        }
        if self.effective_history_retention() < self.context_window_size {
            return Err(RagError::InvalidConfiguration(format!(
                "history_retention ({}) must be at least context_window_size ({})",
                self.effective_history_retention(),
                self.context_window_size
            )));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(RagError::InvalidConfiguration(
                "similarity_threshold must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            RagError::InvalidConfiguration(format!("{key} has an invalid value: '{raw}'"))
        }),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set how many recent messages accompany each turn.
    pub fn context_window_size(mut self, window: usize) -> Self {
        self.config.context_window_size = window;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the context payload budget in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set how many messages each session retains.
    pub fn history_retention(mut self, messages: usize) -> Self {
        self.config.history_retention = Some(messages);
        self
    }

    /// Pin the embedding dimension the pipeline must be built with.
    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = Some(dimension);
        self
    }

    /// Bound the number of chunks held by the vector index.
    pub fn max_chunks(mut self, limit: usize) -> Self {
        self.config.max_chunks = Some(limit);
        self
    }

    /// Bound the number of live conversation sessions.
    pub fn max_sessions(mut self, limit: usize) -> Self {
        self.config.max_sessions = Some(limit);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] when [`RagConfig::validate`] fails.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
