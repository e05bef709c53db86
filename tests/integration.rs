//! End-to-end tests for the retrieval and fusion pipeline.
//!
//! Uses a temp-dir SQLite store, a deterministic hashing embedder (no
//! model backend needed), and a local TCP fixture server for the web
//! fetcher — nothing here touches the real network.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use docfuse::config::{
    CategoryRule, ChunkingConfig, Config, EmbeddingConfig, FusionConfig, RerankerConfig,
    RetrievalConfig, RoutingConfig, StoreConfig, VersionRule, WebConfig,
};
use docfuse::embedding::{DisabledEmbedder, Embedder};
use docfuse::error::ModelError;
use docfuse::models::{Chunk, ChunkMetadata, KnowledgeSourceLocator, SourceRecord};
use docfuse::pipeline::HybridPipeline;
use docfuse::retriever::HybridRetriever;
use docfuse::router::SourceRouter;
use docfuse::store::DocumentStore;
use docfuse::webfetch::WebFetcher;

const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: tokens hash into buckets, the
/// vector is L2-normalized. Identical input always embeds identically,
/// and texts sharing terms have positive cosine similarity.
struct HashingEmbedder;

fn token_bucket(token: &str) -> usize {
    let h = token
        .bytes()
        .fold(0u64, |h, b| h.wrapping_mul(131).wrapping_add(b as u64));
    (h % DIMS as u64) as usize
}

fn embed_one(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if !token.is_empty() {
            v[token_bucket(token)] += 1.0;
        }
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-test"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|t| embed_one(t)).collect())
    }
}

fn make_chunk(source: &str, content: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        content: content.to_string(),
        metadata: ChunkMetadata::for_source(source),
    }
}

async fn open_store(dir: &TempDir) -> Arc<DocumentStore> {
    Arc::new(
        DocumentStore::open(dir.path(), Arc::new(HashingEmbedder))
            .await
            .unwrap(),
    )
}

async fn seeded_store(dir: &TempDir) -> Arc<DocumentStore> {
    let store = open_store(dir).await;
    store
        .index(&[
            make_chunk("doc1", "SELinux enforces mandatory access control."),
            make_chunk("doc2", "The firewall default service is firewalld."),
        ])
        .await
        .unwrap();
    store
}

// ============ Document store ============

#[tokio::test]
async fn empty_store_searches_return_empty() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(store.dense_search("anything", 5).await.unwrap().is_empty());
    assert!(store.sparse_search("anything", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_survives_close_and_reopen() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path(), Arc::new(HashingEmbedder))
        .await
        .unwrap();
    store
        .index(&[
            make_chunk("doc1", "SELinux enforces mandatory access control."),
            make_chunk("doc2", "The firewall default service is firewalld."),
        ])
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    store.close().await;

    let reopened = open_store(&dir).await;
    assert_eq!(reopened.count().await.unwrap(), 2);
    let hits = reopened.sparse_search("firewalld", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.metadata.source, "doc2");
}

#[tokio::test]
async fn corrupt_index_rebuilds_empty_instead_of_failing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.db"), b"this is not a sqlite database").unwrap();

    let store = open_store(&dir).await;
    assert_eq!(store.count().await.unwrap(), 0);

    // And the rebuilt store is fully usable.
    store
        .index(&[make_chunk("doc1", "SELinux enforces mandatory access control.")])
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn dense_search_ranks_by_similarity() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;

    let results = store
        .dense_search("how do I check SELinux status", 2)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.metadata.source, "doc1");
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn retrieval_prefix_stable_under_larger_k() {
    // P4: a larger k never reorders the smaller-k prefix.
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let chunks: Vec<Chunk> = (0..8)
        .map(|i| {
            make_chunk(
                &format!("doc{}", i),
                &format!("selinux policy notes part {} with filler text", i),
            )
        })
        .collect();
    store.index(&chunks).await.unwrap();

    let small = store.dense_search("selinux policy", 3).await.unwrap();
    let large = store.dense_search("selinux policy", 8).await.unwrap();
    let small_ids: Vec<&str> = small.iter().map(|c| c.chunk.id.as_str()).collect();
    let large_ids: Vec<&str> = large.iter().take(3).map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(small_ids, large_ids);

    let small = store.sparse_search("selinux policy", 3).await.unwrap();
    let large = store.sparse_search("selinux policy", 8).await.unwrap();
    let small_ids: Vec<&str> = small.iter().map(|c| c.chunk.id.as_str()).collect();
    let large_ids: Vec<&str> = large.iter().take(3).map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(small_ids, large_ids);
}

#[tokio::test]
async fn clear_empties_both_indices() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;

    store.clear().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.sparse_search("selinux", 5).await.unwrap().is_empty());
    assert!(store.dense_search("selinux", 5).await.unwrap().is_empty());
}

// ============ Hybrid retrieval ============

#[tokio::test]
async fn scenario_a_selinux_query_ranks_selinux_chunk_first() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;

    let retriever = HybridRetriever::new(store, &RetrievalConfig::default());
    let results = retriever
        .retrieve("how do I check SELinux status", 2)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.metadata.source, "doc1");
}

#[tokio::test]
async fn dense_outage_degrades_to_sparse_only() {
    let dir = TempDir::new().unwrap();
    {
        // Index with a working embedder, then reopen with a dead one.
        seeded_store(&dir).await;
    }
    let store = Arc::new(
        DocumentStore::open(dir.path(), Arc::new(DisabledEmbedder))
            .await
            .unwrap(),
    );

    assert!(matches!(
        store.dense_search("selinux", 5).await.unwrap_err(),
        docfuse::error::StoreError::Model(_)
    ));

    let retriever = HybridRetriever::new(store, &RetrievalConfig::default());
    let results = retriever.retrieve("selinux access control", 5).await.unwrap();
    assert!(!results.is_empty(), "sparse results must survive a dense outage");
    assert_eq!(results[0].chunk.metadata.source, "doc1");
}

// ============ Web fetcher ============

/// Minimal one-thread HTTP server that serves a fixed body and counts
/// requests.
fn spawn_fixture_server(body: String) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_counter = hits.clone();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => break,
            };
            hits_counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (format!("http://{}", addr), hits)
}

fn locator(url: &str) -> KnowledgeSourceLocator {
    KnowledgeSourceLocator {
        url: url.to_string(),
        category: "general".to_string(),
        version: None,
    }
}

fn test_web_config() -> WebConfig {
    WebConfig {
        timeout_secs: 5,
        min_content_length: 20,
        fetch_pause_ms: 0,
        ..WebConfig::default()
    }
}

#[tokio::test]
async fn repeat_fetch_hits_cache_not_network() {
    // P5: byte-identical content, exactly one network call.
    let body = "<html><head><title>Fixture</title></head><body><main>SELinux fixture \
                content with enough text to pass the quality gate.</main></body></html>";
    let (url, hits) = spawn_fixture_server(body.to_string());

    let fetcher = WebFetcher::new(test_web_config()).unwrap();
    let loc = locator(&url);

    let first = fetcher.fetch(&loc).await.expect("first fetch");
    let second = fetcher.fetch(&loc).await.expect("second fetch");

    assert_eq!(first.content, second.content);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Clearing the cache forces a new network call.
    fetcher.clear_cache();
    let third = fetcher.fetch(&loc).await.expect("third fetch");
    assert_eq!(third.content, first.content);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn scenario_c_short_page_is_rejected() {
    let body = format!(
        "<html><body><p>{}</p></body></html>",
        "x".repeat(50)
    );
    let (url, _hits) = spawn_fixture_server(body);

    let fetcher = WebFetcher::new(WebConfig {
        min_content_length: 100,
        ..test_web_config()
    })
    .unwrap();

    assert!(fetcher.fetch(&locator(&url)).await.is_none());
}

#[tokio::test]
async fn failed_fetch_does_not_abort_siblings() {
    let body = "<html><body><main>Reachable fixture content with enough \
                text to pass the gate.</main></body></html>";
    let (url, _hits) = spawn_fixture_server(body.to_string());

    // Port 9 on localhost: nothing listening, connection refused.
    let locators = vec![locator("http://127.0.0.1:9/"), locator(&url)];

    let fetcher = WebFetcher::new(test_web_config()).unwrap();
    let docs = fetcher.fetch_all(&locators).await;

    assert_eq!(docs.len(), 1);
    assert!(docs[0].content.contains("Reachable fixture content"));
}

// ============ Source routing ============

fn routing_fixture() -> RoutingConfig {
    RoutingConfig {
        fallback: "general".to_string(),
        categories: vec![
            CategoryRule {
                name: "openshift".to_string(),
                keywords: vec!["openshift".to_string(), "oc command".to_string()],
                locators: vec!["https://docs.example.com/openshift".to_string()],
            },
            CategoryRule {
                name: "rhel".to_string(),
                keywords: vec!["rhel".to_string(), "systemd".to_string()],
                locators: vec!["https://docs.example.com/rhel".to_string()],
            },
            CategoryRule {
                name: "general".to_string(),
                keywords: vec![],
                locators: vec!["https://docs.example.com/".to_string()],
            },
        ],
        versions: vec![
            VersionRule {
                product: "openshift".to_string(),
                version: "4.18".to_string(),
                locator: "https://docs.example.com/openshift/4.18".to_string(),
            },
            VersionRule {
                product: "rhel".to_string(),
                version: "9".to_string(),
                locator: "https://docs.example.com/rhel/9".to_string(),
            },
        ],
    }
}

#[test]
fn p6_unmatched_query_gets_fallback_category() {
    let router = SourceRouter::new(&routing_fixture(), 8).unwrap();
    assert_eq!(router.classify("asdkjasd petunia"), vec!["general"]);
}

#[test]
fn scenario_d_openshift_418_routes_to_version_locator() {
    let router = SourceRouter::new(&routing_fixture(), 8).unwrap();
    let query = "How do I set up an OpenShift 4.18 cluster";

    let categories = router.classify(query);
    assert_eq!(categories, vec!["openshift"]);

    let versions = router.extract_versions(query);
    assert_eq!(versions.get("openshift"), Some(&Some("4.18".to_string())));
    assert_eq!(versions.get("rhel"), Some(&None));

    let locators = router.resolve_locators(&categories, &versions);
    assert_eq!(locators.len(), 1);
    assert_eq!(locators[0].url, "https://docs.example.com/openshift/4.18");

    // Without a version-table hit the generic list applies.
    let query = "How do I set up an OpenShift 4.2 cluster";
    let versions = router.extract_versions(query);
    let locators = router.resolve_locators(&categories, &versions);
    assert_eq!(locators[0].url, "https://docs.example.com/openshift");
}

// ============ Pipeline ============

fn local_only_config(dir: &TempDir) -> Config {
    Config {
        store: StoreConfig {
            dir: dir.path().to_path_buf(),
        },
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        reranker: RerankerConfig::default(),
        web: test_web_config(),
        fusion: FusionConfig {
            local_weight: 1.0,
            web_weight: 0.0,
            ..FusionConfig::default()
        },
        routing: routing_fixture(),
    }
}

#[tokio::test]
async fn pipeline_builds_local_context_with_sources() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;

    let config = local_only_config(&dir);
    let pipeline = HybridPipeline::new(&config, store, Arc::new(HashingEmbedder)).unwrap();

    let context = pipeline
        .answer_context("how do I check SELinux status")
        .await
        .unwrap();

    assert!(context.has_local);
    assert!(!context.has_web);
    assert!(context.text.contains("SELinux enforces"));
    assert!(context
        .sources
        .iter()
        .any(|s| matches!(s, SourceRecord::Local { filename } if filename == "doc1")));
}

#[tokio::test]
async fn pipeline_empty_retrieval_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let config = local_only_config(&dir);
    let pipeline = HybridPipeline::new(&config, store, Arc::new(HashingEmbedder)).unwrap();

    let context = pipeline.answer_context("zxqv plomtrik").await.unwrap();
    assert!(!context.has_local);
    assert!(!context.has_web);
    assert_eq!(context.text, "");
    assert!(context.sources.is_empty());
}

#[tokio::test]
async fn pipeline_survives_total_model_outage() {
    // Indexed corpus, then every model-backed stage (dense search and
    // the enabled reranker) goes down: the query still answers from
    // the sparse index.
    let dir = TempDir::new().unwrap();
    {
        seeded_store(&dir).await;
    }
    let store = Arc::new(
        DocumentStore::open(dir.path(), Arc::new(DisabledEmbedder))
            .await
            .unwrap(),
    );

    let mut config = local_only_config(&dir);
    config.reranker = RerankerConfig { enabled: true };

    let pipeline = HybridPipeline::new(&config, store, Arc::new(DisabledEmbedder)).unwrap();
    let context = pipeline
        .answer_context("selinux access control")
        .await
        .unwrap();

    assert!(context.has_local);
    assert!(context.text.contains("SELinux enforces"));
}

#[tokio::test]
async fn pipeline_fuses_web_content_from_fixture_server() {
    let body = "<html><head><title>Cluster Guide</title></head><body><main>Fixture \
                documentation describing cluster setup in enough detail to pass \
                the quality gate.</main></body></html>";
    let (url, _hits) = spawn_fixture_server(body.to_string());

    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;

    let mut config = local_only_config(&dir);
    config.fusion.web_weight = 0.6;
    config.routing.categories[0].locators = vec![url.clone()];

    let pipeline = HybridPipeline::new(&config, store, Arc::new(HashingEmbedder)).unwrap();
    let context = pipeline
        .answer_context("openshift cluster setup")
        .await
        .unwrap();

    assert!(context.has_web);
    assert!(context.text.contains("Fixture documentation"));
    assert!(context
        .sources
        .iter()
        .any(|s| matches!(s, SourceRecord::Web { url: u, .. } if *u == url)));
}
