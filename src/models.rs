//! Core data models used throughout docfuse.
//!
//! These types represent the chunks, retrieval candidates, external
//! knowledge locators, and fused contexts that flow through the
//! retrieval and fusion pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Provenance metadata attached to every chunk.
///
/// `source` is the only required field: the origin identifier of the
/// text (a file path, an upload name, a command). The rest is stamped
/// when the producing adapter knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub directory: Option<String>,
    pub file_type: Option<String>,
    pub page: Option<i64>,
    /// Position of this chunk within its source document.
    pub chunk_seq: Option<i64>,
    pub total_chunks: Option<i64>,
}

impl ChunkMetadata {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Last path component of `source`, for display and citations.
    pub fn filename(&self) -> &str {
        self.source
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.source)
    }
}

/// A unit of retrievable text. Immutable once stored: re-indexing a
/// source inserts new chunks rather than mutating existing rows.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Which first-pass retriever produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverOrigin {
    Dense,
    Sparse,
}

/// An intermediate retrieval hit. Scores are retriever-local and not
/// comparable across origins until fusion normalizes them.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    pub chunk: Chunk,
    pub score: f64,
    pub origin: RetrieverOrigin,
}

/// A post-fusion / post-rerank candidate. `fused_score` is comparable
/// across results; descending means more relevant.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub fused_score: f64,
}

/// An external pointer to a knowledge source, tagged with the topical
/// category that selected it and the product version it targets (if a
/// version-specific table entry matched).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSourceLocator {
    pub url: String,
    pub category: String,
    pub version: Option<String>,
}

/// Fetched and cleaned external content. `content` is free of
/// script/style/navigation markup and bounded by the configured
/// maximum length.
#[derive(Debug, Clone)]
pub struct WebDocument {
    pub url: String,
    pub title: String,
    pub content: String,
    pub doc_type: String,
    pub fetched_at: DateTime<Utc>,
}

/// Provenance record for one contributor to a fused context.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceRecord {
    Local {
        filename: String,
    },
    Web {
        title: String,
        url: String,
        doc_type: String,
    },
}

/// The final artifact handed to the generation step: one bounded text
/// blob plus the provenance records for everything included in it.
///
/// `has_local` / `has_web` reflect what was actually included after
/// weight gating, not what was merely available.
#[derive(Debug, Clone, Serialize)]
pub struct FusedContext {
    pub text: String,
    pub sources: Vec<SourceRecord>,
    pub has_local: bool,
    pub has_web: bool,
}
