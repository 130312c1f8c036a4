//! Reading text files into the pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ragchat_core::{Document, RagPipeline};
use tracing::info;

/// Decode file bytes as UTF-8, falling back to Latin-1.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Document id for a file: its file name, or the whole path when it has none.
fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read every file and ingest it as one document.
pub async fn ingest_files(pipeline: &RagPipeline, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let bytes =
            tokio::fs::read(path).await.with_context(|| format!("failed to read {}", path.display()))?;
        let id = document_id(path);
        let document = Document::new(&id, decode_text(bytes)).with_source_name(&id);

        let chunks = pipeline
            .ingest(&document)
            .await
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        info!(path = %path.display(), chunk_count = chunks.len(), "loaded document");
    }
    Ok(())
}
