//! Second-pass relevance reordering.
//!
//! The first-pass retrievers rank with coarse signals (term frequency,
//! whole-chunk embedding similarity). The reranker rescores every
//! (query, chunk) pair with a [`RelevanceScorer`] and reorders the
//! candidate list by those scores.
//!
//! The stage is optional: callers on a strict latency budget can skip
//! straight from hybrid retrieval to fusion, and the pipeline skips it
//! when the scorer's backend is unavailable.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::ModelError;
use crate::models::{CandidateResult, RankedResult};

/// Pairwise relevance capability: higher = more relevant. No fixed
/// range is guaranteed — scores are only used for relative ordering.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, query: &str, document: &str) -> Result<f32, ModelError>;
}

/// Scores a pair by cosine similarity of the two texts' embeddings.
///
/// Stands in for a dedicated cross-encoder where none is deployed; the
/// seam stays the same either way.
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    async fn score(&self, query: &str, document: &str) -> Result<f32, ModelError> {
        let vectors = self
            .embedder
            .embed(&[query.to_string(), document.to_string()])
            .await?;
        if vectors.len() != 2 {
            return Err(ModelError::InvalidResponse(format!(
                "expected 2 embeddings, got {}",
                vectors.len()
            )));
        }
        Ok(cosine_similarity(&vectors[0], &vectors[1]))
    }
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Score every candidate independently against `query`, sort
    /// descending, and keep the top `top_k`.
    ///
    /// Pure: no state is kept between calls. Empty input returns empty
    /// output without touching the scoring model.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<CandidateResult>,
        top_k: usize,
    ) -> Result<Vec<RankedResult>, ModelError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let score = self.scorer.score(query, &candidate.chunk.content).await?;
            ranked.push(RankedResult {
                chunk: candidate.chunk,
                fused_score: score as f64,
            });
        }

        ranked.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        ranked.truncate(top_k);

        Ok(ranked)
    }
}
