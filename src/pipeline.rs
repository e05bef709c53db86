//! Per-query orchestration: retrieval, optional reranking, source
//! routing, web fetching, and fusion.
//!
//! The two arms are independent and run in parallel: the local arm
//! pulls and ranks chunks from the document store while the web arm
//! routes the query to locators and fetches them. Either arm can come
//! back empty without affecting the other; the fusion step reconciles
//! whatever both produced.

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::fuse::{fuse, FusionPolicy};
use crate::models::{CandidateResult, FusedContext, RankedResult, SourceRecord, WebDocument};
use crate::rerank::{EmbeddingScorer, Reranker};
use crate::retriever::HybridRetriever;
use crate::router::SourceRouter;
use crate::store::DocumentStore;
use crate::webfetch::WebFetcher;

pub struct HybridPipeline {
    retriever: HybridRetriever,
    reranker: Option<Reranker>,
    router: SourceRouter,
    fetcher: WebFetcher,
    fusion: FusionPolicy,
    candidate_k: usize,
    final_k: usize,
}

impl HybridPipeline {
    pub fn new(
        config: &Config,
        store: Arc<DocumentStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let retriever = HybridRetriever::new(store, &config.retrieval);
        let reranker = config
            .reranker
            .enabled
            .then(|| Reranker::new(Arc::new(EmbeddingScorer::new(embedder))));
        let router = SourceRouter::new(&config.routing, config.web.max_locators)?;
        let fetcher = WebFetcher::new(config.web.clone())?;

        Ok(Self {
            retriever,
            reranker,
            router,
            fetcher,
            fusion: FusionPolicy::from(&config.fusion),
            candidate_k: config.retrieval.candidate_k,
            final_k: config.retrieval.final_k,
        })
    }

    /// Build the fused context for one query. An all-empty result is a
    /// valid outcome (`has_local == has_web == false`), not an error —
    /// the caller decides what "no information found" looks like.
    pub async fn answer_context(&self, query: &str) -> Result<FusedContext> {
        let (local, web_documents) = tokio::join!(self.local_arm(query), self.web_arm(query));
        let (local_answer, local_sources) = local?;

        Ok(fuse(
            &local_answer,
            &local_sources,
            &web_documents,
            &self.fusion,
        ))
    }

    /// Reset the web fetch cache (service restart semantics without a
    /// restart).
    pub fn clear_web_cache(&self) {
        self.fetcher.clear_cache();
    }

    async fn local_arm(&self, query: &str) -> Result<(String, Vec<SourceRecord>)> {
        // A gated-out side is not searched at all.
        if self.fusion.local_weight <= 0.0 {
            return Ok((String::new(), Vec::new()));
        }

        let candidates = self.retriever.retrieve(query, self.candidate_k).await?;
        let ranked = self.rank(query, candidates).await;

        let local_answer = ranked
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let local_sources = ranked
            .iter()
            .map(|r| SourceRecord::Local {
                filename: r.chunk.metadata.filename().to_string(),
            })
            .collect();

        Ok((local_answer, local_sources))
    }

    /// Apply the optional rerank stage. A failing relevance backend
    /// degrades to the fused retrieval order instead of failing the
    /// query.
    async fn rank(&self, query: &str, candidates: Vec<CandidateResult>) -> Vec<RankedResult> {
        if let Some(reranker) = &self.reranker {
            match reranker.rerank(query, candidates.clone(), self.final_k).await {
                Ok(ranked) => return ranked,
                Err(e) => {
                    warn!("reranker unavailable ({}); keeping fused retrieval order", e);
                }
            }
        }

        candidates
            .into_iter()
            .take(self.final_k)
            .map(|c| RankedResult {
                chunk: c.chunk,
                fused_score: c.score,
            })
            .collect()
    }

    async fn web_arm(&self, query: &str) -> Vec<WebDocument> {
        if self.fusion.web_weight <= 0.0 {
            return Vec::new();
        }

        let locators = self.router.route(query);
        self.fetcher.fetch_all(&locators).await
    }
}
