//! # ragchat-core
//!
//! Retrieval-augmented chat over user-supplied documents.
//!
//! Documents are split into overlapping character windows, embedded into a
//! fixed-dimension vector space and held in an in-memory index. Each chat
//! turn embeds the question, retrieves the closest chunks, blends them with
//! the session's recent messages under a size budget, and asks a language
//! model for the reply. All state lives in memory for the lifetime of the
//! process.
//!
//! ## Modules
//!
//! - [`chunking`]: sliding-window and sentence-aware chunkers
//! - [`embedding`]: the [`EmbeddingProvider`] trait and an offline hash embedder
//! - [`vectorstore`] / [`inmemory`]: the [`VectorIndex`] trait and its brute-force implementation
//! - [`conversation`]: per-session message history
//! - [`context`]: assembly of the bounded model context
//! - [`llm`]: the [`CompletionProvider`] trait
//! - [`pipeline`]: the [`RagPipeline`] orchestrator
//! - `gemini` (feature `gemini`): Gemini REST embedding and completion providers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragchat_core::{HashEmbeddingProvider, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::new(256)))
//!     .completion_provider(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest_document("notes", "The sky is blue. Grass is green.").await?;
//! let reply = pipeline.converse("session-1", "What colour is grass?").await?;
//! ```

pub mod chat;
pub mod chunking;
pub mod config;
pub mod context;
pub mod conversation;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod llm;
pub mod pipeline;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use chat::{ChatRequest, ChatResponse, SourceRef};
pub use chunking::{Chunker, FixedSizeChunker, SentenceChunker, TextSpan, chunk_spans};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::ContextPayload;
pub use conversation::{ConversationMessage, ConversationStore, Role, SessionTurnGuard};
pub use document::{Document, DocumentChunk, IndexStats, SearchResult};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{RagError, Result};
pub use inmemory::{InMemoryVectorIndex, cosine_similarity};
pub use llm::{CompletionProvider, DEFAULT_SYSTEM_PROMPT};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use vectorstore::VectorIndex;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiCompletionProvider, GeminiEmbeddingProvider};
