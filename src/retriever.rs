//! Weighted dense/sparse fusion.
//!
//! Runs both store searches for a query and merges their rankings into
//! one list. Scores from the two retrievers live on different scales,
//! so each side is min-max normalized to `[0, 1]` before the weighted
//! sum; a chunk appearing in both lists accumulates contributions from
//! each.
//!
//! The weights are configuration constants (default dense 0.7 / sparse
//! 0.3), never derived at runtime. If the embedding backend is down,
//! retrieval degrades to the sparse ranking alone and logs the
//! degradation — a missing model must not fail the query.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::config::RetrievalConfig;
use crate::error::StoreError;
use crate::models::{CandidateResult, RetrieverOrigin};
use crate::store::DocumentStore;

pub struct HybridRetriever {
    store: Arc<DocumentStore>,
    dense_weight: f64,
    sparse_weight: f64,
}

impl HybridRetriever {
    pub fn new(store: Arc<DocumentStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            dense_weight: config.dense_weight,
            sparse_weight: config.sparse_weight,
        }
    }

    /// Produce one fused candidate ranking for `query`, pulling up to
    /// `k` candidates from each retriever. The fused union (up to 2k
    /// results) is returned; callers apply their own final top-k after
    /// optional reranking.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<CandidateResult>> {
        let sparse = self.store.sparse_search(query, k).await?;

        let dense = match self.store.dense_search(query, k).await {
            Ok(candidates) => candidates,
            Err(StoreError::Model(e)) => {
                warn!("dense retrieval unavailable ({}); using sparse results only", e);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(fuse_rankings(
            dense,
            sparse,
            self.dense_weight,
            self.sparse_weight,
        ))
    }
}

/// Merge two candidate lists under fixed weights.
///
/// Each list is normalized independently; a chunk present in both
/// accumulates `w_dense·norm_dense + w_sparse·norm_sparse`. If one
/// list is empty, the result is the other list's (weighted) ranking —
/// fusion never errors on one-sided input.
pub fn fuse_rankings(
    dense: Vec<CandidateResult>,
    sparse: Vec<CandidateResult>,
    dense_weight: f64,
    sparse_weight: f64,
) -> Vec<CandidateResult> {
    if dense.is_empty() && sparse.is_empty() {
        return Vec::new();
    }

    struct Accumulated {
        candidate: CandidateResult,
        dense_part: f64,
        sparse_part: f64,
    }

    let mut merged: HashMap<String, Accumulated> = HashMap::new();

    for (candidates, weight) in [(dense, dense_weight), (sparse, sparse_weight)] {
        for (candidate, norm) in normalize(candidates) {
            let contribution = weight * norm;
            let entry = merged
                .entry(candidate.chunk.id.clone())
                .or_insert_with(|| Accumulated {
                    candidate: candidate.clone(),
                    dense_part: 0.0,
                    sparse_part: 0.0,
                });
            match candidate.origin {
                RetrieverOrigin::Dense => entry.dense_part += contribution,
                RetrieverOrigin::Sparse => entry.sparse_part += contribution,
            }
        }
    }

    let mut fused: Vec<CandidateResult> = merged
        .into_values()
        .map(|acc| {
            let origin = if acc.dense_part >= acc.sparse_part {
                RetrieverOrigin::Dense
            } else {
                RetrieverOrigin::Sparse
            };
            CandidateResult {
                chunk: acc.candidate.chunk,
                score: acc.dense_part + acc.sparse_part,
                origin,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });

    fused
}

/// Min-max normalize a candidate list's scores to `[0, 1]`.
/// All-equal scores normalize to `1.0`.
fn normalize(candidates: Vec<CandidateResult>) -> Vec<(CandidateResult, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .into_iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};

    fn candidate(id: &str, score: f64, origin: RetrieverOrigin) -> CandidateResult {
        CandidateResult {
            chunk: Chunk {
                id: id.to_string(),
                content: format!("content of {}", id),
                metadata: ChunkMetadata::for_source(format!("{}.txt", id)),
            },
            score,
            origin,
        }
    }

    fn ids(results: &[CandidateResult]) -> Vec<&str> {
        results.iter().map(|c| c.chunk.id.as_str()).collect()
    }

    #[test]
    fn both_empty_yields_empty() {
        assert!(fuse_rankings(Vec::new(), Vec::new(), 0.7, 0.3).is_empty());
    }

    #[test]
    fn single_sided_input_passes_through_in_order() {
        let sparse = vec![
            candidate("a", 9.0, RetrieverOrigin::Sparse),
            candidate("b", 4.0, RetrieverOrigin::Sparse),
            candidate("c", 1.0, RetrieverOrigin::Sparse),
        ];
        let fused = fuse_rankings(Vec::new(), sparse, 0.7, 0.3);
        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
    }

    #[test]
    fn chunk_in_both_lists_accumulates() {
        let dense = vec![
            candidate("shared", 0.9, RetrieverOrigin::Dense),
            candidate("dense_only", 0.8, RetrieverOrigin::Dense),
            candidate("dense_low", 0.1, RetrieverOrigin::Dense),
        ];
        let sparse = vec![
            candidate("shared", 8.0, RetrieverOrigin::Sparse),
            candidate("sparse_only", 5.0, RetrieverOrigin::Sparse),
            candidate("sparse_low", 1.0, RetrieverOrigin::Sparse),
        ];
        let fused = fuse_rankings(dense, sparse, 0.7, 0.3);
        // shared: 0.7·1.0 + 0.3·1.0 = 1.0 — tops both one-sided maxima.
        assert_eq!(fused[0].chunk.id, "shared");
        assert!((fused[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dense_weight_dominates_ordering() {
        let dense = vec![
            candidate("d", 1.0, RetrieverOrigin::Dense),
            candidate("s", 0.0, RetrieverOrigin::Dense),
        ];
        let sparse = vec![
            candidate("s", 10.0, RetrieverOrigin::Sparse),
            candidate("d", 0.0, RetrieverOrigin::Sparse),
        ];
        // d: 0.7·1.0 + 0.3·0.0 = 0.7; s: 0.7·0.0 + 0.3·1.0 = 0.3.
        let fused = fuse_rankings(dense, sparse, 0.7, 0.3);
        assert_eq!(ids(&fused), vec!["d", "s"]);

        // Flipped weights flip the ordering.
        let dense = vec![
            candidate("d", 1.0, RetrieverOrigin::Dense),
            candidate("s", 0.0, RetrieverOrigin::Dense),
        ];
        let sparse = vec![
            candidate("s", 10.0, RetrieverOrigin::Sparse),
            candidate("d", 0.0, RetrieverOrigin::Sparse),
        ];
        let fused = fuse_rankings(dense, sparse, 0.3, 0.7);
        assert_eq!(ids(&fused), vec!["s", "d"]);
    }

    #[test]
    fn equal_scores_tie_break_on_chunk_id() {
        let sparse = vec![
            candidate("beta", 3.0, RetrieverOrigin::Sparse),
            candidate("alpha", 3.0, RetrieverOrigin::Sparse),
        ];
        let fused = fuse_rankings(Vec::new(), sparse, 0.7, 0.3);
        assert_eq!(ids(&fused), vec!["alpha", "beta"]);
    }

    #[test]
    fn merged_origin_tracks_larger_contribution() {
        let dense = vec![
            candidate("x", 1.0, RetrieverOrigin::Dense),
            candidate("pad", 0.0, RetrieverOrigin::Dense),
        ];
        let sparse = vec![
            candidate("x", 1.0, RetrieverOrigin::Sparse),
            candidate("pad2", 0.0, RetrieverOrigin::Sparse),
        ];
        let fused = fuse_rankings(dense, sparse, 0.7, 0.3);
        let x = fused.iter().find(|c| c.chunk.id == "x").unwrap();
        assert_eq!(x.origin, RetrieverOrigin::Dense);
    }
}
