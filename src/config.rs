use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    pub routing: RoutingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding the persisted index (`index.db`).
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Weight of the dense (embedding) retriever in hybrid fusion.
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    /// Weight of the sparse (keyword) retriever in hybrid fusion.
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
    /// Candidates pulled per retriever before fusion.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Results kept after rerank/truncation.
    #[serde(default = "default_final_k")]
    pub final_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            candidate_k: default_candidate_k(),
            final_k: default_final_k(),
        }
    }
}

fn default_dense_weight() -> f64 {
    0.7
}
fn default_sparse_weight() -> f64 {
    0.3
}
fn default_candidate_k() -> usize {
    20
}
fn default_final_k() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Pause between consecutive fetches within one routing resolution.
    #[serde(default = "default_fetch_pause_ms")]
    pub fetch_pause_ms: u64,
    /// Maximum locators attempted per query.
    #[serde(default = "default_max_locators")]
    pub max_locators: usize,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_web_timeout_secs(),
            min_content_length: default_min_content_length(),
            max_content_length: default_max_content_length(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_pause_ms: default_fetch_pause_ms(),
            max_locators: default_max_locators(),
            exclude_patterns: default_exclude_patterns(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_web_timeout_secs() -> u64 {
    15
}
fn default_min_content_length() -> usize {
    100
}
fn default_max_content_length() -> usize {
    12000
}
fn default_cache_ttl_secs() -> u64 {
    7200
}
fn default_fetch_pause_ms() -> u64 {
    500
}
fn default_max_locators() -> usize {
    8
}
fn default_exclude_patterns() -> Vec<String> {
    [
        "advertisement",
        "cookie policy",
        "privacy policy",
        "subscribe",
        "newsletter",
        "login required",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_user_agent() -> String {
    "docfuse/0.3 (documentation retrieval)".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FusionConfig {
    #[serde(default = "default_local_weight")]
    pub local_weight: f64,
    #[serde(default = "default_web_weight")]
    pub web_weight: f64,
    /// Hard cap on fused context length, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Per-document preview length for included web content.
    #[serde(default = "default_web_preview_chars")]
    pub web_preview_chars: usize,
    /// Web documents beyond this count are dropped.
    #[serde(default = "default_max_web_documents")]
    pub max_web_documents: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            local_weight: default_local_weight(),
            web_weight: default_web_weight(),
            max_context_chars: default_max_context_chars(),
            web_preview_chars: default_web_preview_chars(),
            max_web_documents: default_max_web_documents(),
        }
    }
}

fn default_local_weight() -> f64 {
    0.4
}
fn default_web_weight() -> f64 {
    0.6
}
fn default_max_context_chars() -> usize {
    64000
}
fn default_web_preview_chars() -> usize {
    2000
}
fn default_max_web_documents() -> usize {
    6
}

/// Category/version/locator tables driving the source router.
///
/// Deliberately plain data rather than anything learned: the routing
/// rules must be auditable and editable in place, because a misrouted
/// query degrades answers with no visible error.
#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    /// Category used when no keyword matches.
    pub fallback: String,
    #[serde(rename = "category")]
    pub categories: Vec<CategoryRule>,
    #[serde(rename = "version", default)]
    pub versions: Vec<VersionRule>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
    pub locators: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VersionRule {
    pub product: String,
    pub version: String,
    pub locator: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

/// Configuration errors indicate a broken deployment, not a transient
/// condition: fail fast rather than silently defaulting.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }

    let r = &config.retrieval;
    if r.dense_weight < 0.0 || r.sparse_weight < 0.0 {
        anyhow::bail!("retrieval weights must be >= 0");
    }
    if r.dense_weight + r.sparse_weight <= 0.0 {
        anyhow::bail!("retrieval.dense_weight + retrieval.sparse_weight must be > 0");
    }
    if r.candidate_k == 0 || r.final_k == 0 {
        anyhow::bail!("retrieval.candidate_k and retrieval.final_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    if config.reranker.enabled && !config.embedding.is_enabled() {
        anyhow::bail!("reranker.enabled requires an embedding provider");
    }

    let f = &config.fusion;
    if f.local_weight < 0.0 || f.web_weight < 0.0 {
        anyhow::bail!("fusion weights must be >= 0");
    }
    if f.max_context_chars == 0 {
        anyhow::bail!("fusion.max_context_chars must be > 0");
    }

    if config.web.max_locators == 0 {
        anyhow::bail!("web.max_locators must be >= 1");
    }
    if config.web.min_content_length > config.web.max_content_length {
        anyhow::bail!("web.min_content_length must be <= web.max_content_length");
    }

    let routing = &config.routing;
    if routing.categories.is_empty() {
        anyhow::bail!("routing must define at least one [[routing.category]]");
    }
    for cat in &routing.categories {
        if cat.name.trim().is_empty() {
            anyhow::bail!("routing category with empty name");
        }
        if cat.keywords.is_empty() && cat.name != routing.fallback {
            anyhow::bail!("routing category '{}' has no keywords", cat.name);
        }
        if cat.locators.is_empty() {
            anyhow::bail!("routing category '{}' has no locators", cat.name);
        }
    }
    if !routing
        .categories
        .iter()
        .any(|c| c.name == routing.fallback)
    {
        anyhow::bail!(
            "routing.fallback '{}' is not a defined category",
            routing.fallback
        );
    }
    for rule in &routing.versions {
        if rule.product.trim().is_empty()
            || rule.version.trim().is_empty()
            || rule.locator.trim().is_empty()
        {
            anyhow::bail!("routing version rule with empty product/version/locator");
        }
    }

    Ok(())
}
