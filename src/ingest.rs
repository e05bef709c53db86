//! Directory ingestion for the CLI.
//!
//! Walks a docs directory (or takes a single file), reads text-like
//! files, splits them into chunks, and indexes them. Binary formats
//! are the job of upstream format adapters; anything indexed here is
//! treated as plain text.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::chunk::split_text;
use crate::config::ChunkingConfig;
use crate::models::ChunkMetadata;
use crate::store::DocumentStore;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "yaml", "yml", "sh", "html", "htm"];

pub struct IngestSummary {
    pub files: u64,
    pub chunks: u64,
}

/// Index a file or directory tree into the store.
pub async fn index_path(
    store: &DocumentStore,
    path: &Path,
    chunking: &ChunkingConfig,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary { files: 0, chunks: 0 };

    if path.is_file() {
        index_file(store, path, chunking, &mut summary).await?;
        return Ok(summary);
    }

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !is_text_file(entry.path()) {
            continue;
        }
        index_file(store, entry.path(), chunking, &mut summary).await?;
    }

    Ok(summary)
}

async fn index_file(
    store: &DocumentStore,
    path: &Path,
    chunking: &ChunkingConfig,
    summary: &mut IngestSummary,
) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut metadata = ChunkMetadata::for_source(path.display().to_string());
    metadata.directory = path
        .parent()
        .map(|p| p.display().to_string())
        .filter(|p| !p.is_empty());
    metadata.file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let chunks = split_text(&text, &metadata, chunking);
    if chunks.is_empty() {
        return Ok(());
    }

    store.index(&chunks).await?;

    summary.files += 1;
    summary.chunks += chunks.len() as u64;
    Ok(())
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
