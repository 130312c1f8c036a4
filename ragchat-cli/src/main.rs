//! ragchat - chat with local text documents from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Rank chunks of a few files against a query, no API key needed
//! ragchat --offline search --doc notes.txt --doc faq.md "refund policy"
//!
//! # Interactive chat grounded in a document (needs GEMINI_API_KEY)
//! ragchat chat --doc handbook.txt
//!
//! # Tune chunking and retrieval
//! ragchat --config ragchat.json chat --doc handbook.txt --session team
//! ```

mod commands;
mod loader;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ragchat_core::{
    EmbeddingProvider, GeminiCompletionProvider, GeminiEmbeddingProvider, HashEmbeddingProvider,
    RagConfig, RagPipeline,
};
use tracing_subscriber::EnvFilter;

/// Retrieval-augmented chat over local text files.
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// JSON file with pipeline settings (default: RAGCHAT_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in hash embedder instead of Gemini embeddings
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest documents and print the best matching chunks for a query
    Search {
        /// Text file to ingest (repeatable)
        #[arg(long = "doc", required = true)]
        docs: Vec<PathBuf>,

        /// Search query
        query: String,
    },

    /// Ingest documents and start an interactive chat
    Chat {
        /// Text file to ingest (repeatable)
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,

        /// Session to continue (default: a new one)
        #[arg(long)]
        session: Option<String>,

        /// Answer without retrieving document context
        #[arg(long)]
        no_rag: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Search { docs, query } => {
            let pipeline = build_pipeline(config, cli.offline, false)?;
            loader::ingest_files(&pipeline, &docs).await?;
            commands::search(&pipeline, &query).await
        }
        Command::Chat { docs, session, no_rag } => {
            let pipeline = build_pipeline(config, cli.offline, true)?;
            loader::ingest_files(&pipeline, &docs).await?;
            commands::chat(&pipeline, session, !no_rag).await
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RagConfig> {
    let Some(path) = path else {
        return Ok(RagConfig::from_env()?);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: RagConfig = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn build_pipeline(config: RagConfig, offline: bool, with_llm: bool) -> Result<RagPipeline> {
    let embedder: Arc<dyn EmbeddingProvider> = if offline {
        Arc::new(HashEmbeddingProvider::default())
    } else {
        Arc::new(
            GeminiEmbeddingProvider::from_env()
                .context("set GEMINI_API_KEY or pass --offline to use local embeddings")?,
        )
    };

    let mut builder = RagPipeline::builder().config(config).embedding_provider(embedder);
    if with_llm {
        let llm = match GeminiCompletionProvider::from_env() {
            Ok(llm) => llm,
            Err(e) => bail!("chat needs a language model: {e}"),
        };
        builder = builder.completion_provider(Arc::new(llm));
    }
    Ok(builder.build()?)
}
