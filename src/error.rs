//! Typed error classes for the retrieval pipeline.
//!
//! Most of the crate uses `anyhow::Result` at command boundaries, like
//! the rest of the codebase. The enums here exist for the one failure
//! class callers must be able to match on: a capability backend
//! (embedding or relevance model) being unavailable, which the hybrid
//! retriever degrades on instead of failing the query.

use thiserror::Error;

/// Failure of an external model capability (embedding or pairwise
/// relevance scoring).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    #[error("model backend returned a malformed response: {0}")]
    InvalidResponse(String),
}

/// Failure from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The injected embedder failed; recoverable by degrading to
    /// sparse-only retrieval.
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("store query failed: {0}")]
    Db(#[from] sqlx::Error),
}
