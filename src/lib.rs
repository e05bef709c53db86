//! # docfuse
//!
//! A hybrid retrieval and knowledge-fusion engine for technical
//! documentation Q&A.
//!
//! docfuse answers "which passages are relevant to this question?" for
//! a mixed corpus: chunks indexed in a local store, plus live pages
//! from routed documentation sites. It fuses dense (embedding) and
//! sparse (BM25) retrieval, optionally reranks with a pairwise
//! relevance model, and assembles a bounded context with provenance
//! records — the input to whatever LLM sits downstream.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────┐
//!        ┌───────▶│ Source Router   │──▶ locators ──▶ Web Fetcher ─┐
//!        │        └────────────────┘                               ▼
//! query ─┤                                                  ┌───────────┐
//!        │        ┌────────────────┐      ┌──────────┐      │  Fusion    │──▶ context
//!        └───────▶│ Hybrid Retriever│─────▶│ Reranker │─────▶│  Engine    │    + sources
//!                 │ (dense + sparse)│      │(optional)│      └───────────┘
//!                 └────────────────┘      └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlap-aware text splitting |
//! | [`embedding`] | Embedding capability and backends |
//! | [`store`] | Persistent chunk store (dense + sparse indices) |
//! | [`retriever`] | Weighted dense/sparse fusion |
//! | [`rerank`] | Pairwise relevance reordering |
//! | [`router`] | Category/version/locator routing |
//! | [`webfetch`] | Web content fetching and cleaning |
//! | [`fuse`] | Weighted context fusion |
//! | [`pipeline`] | Per-query orchestration |
//! | [`ingest`] | Directory indexing |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fuse;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod retriever;
pub mod router;
pub mod store;
pub mod webfetch;
