//! # docfuse CLI
//!
//! The `docfuse` binary wraps the library for operating an index and
//! inspecting what the retrieval pipeline produces for a query.
//!
//! ## Usage
//!
//! ```bash
//! docfuse --config ./config/docfuse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docfuse init` | Create the store directory and index database |
//! | `docfuse index <path>` | Chunk and index a file or directory |
//! | `docfuse search "<query>"` | Search indexed chunks |
//! | `docfuse context "<query>"` | Build the full fused context for a query |
//! | `docfuse routes "<query>"` | Show category/version/locator routing |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use docfuse::config::{load_config, Config};
use docfuse::embedding::create_embedder;
use docfuse::ingest::index_path;
use docfuse::models::SourceRecord;
use docfuse::pipeline::HybridPipeline;
use docfuse::retriever::HybridRetriever;
use docfuse::router::SourceRouter;
use docfuse::store::DocumentStore;

/// docfuse — hybrid retrieval and knowledge fusion for technical
/// documentation Q&A.
#[derive(Parser)]
#[command(
    name = "docfuse",
    about = "Hybrid retrieval and knowledge fusion for technical documentation Q&A",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docfuse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store directory and index database.
    ///
    /// Idempotent — running it against an existing store is safe. A
    /// corrupt index found here (or on any later open) is moved aside
    /// and rebuilt empty.
    Init,

    /// Chunk and index a file or directory of text documents.
    Index {
        /// File or directory to ingest.
        path: PathBuf,
    },

    /// Search indexed chunks and print the ranked results.
    Search {
        /// The query text.
        query: String,
        /// Candidates pulled per retriever.
        #[arg(long)]
        k: Option<usize>,
        /// Retrieval mode: dense, sparse, or hybrid.
        #[arg(long, default_value = "hybrid")]
        mode: String,
    },

    /// Build the fused local+web context for a query and print it with
    /// its source records.
    Context {
        /// The query text.
        query: String,
    },

    /// Show how a query routes: categories, extracted versions, and
    /// resolved locators.
    Routes {
        /// The query text.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Index { path } => run_index(&config, &path).await,
        Commands::Search { query, k, mode } => run_search(&config, &query, k, &mode).await,
        Commands::Context { query } => run_context(&config, &query).await,
        Commands::Routes { query } => run_routes(&config, &query),
    }
}

async fn open_store(config: &Config) -> Result<Arc<DocumentStore>> {
    let embedder = create_embedder(&config.embedding)?;
    let store = DocumentStore::open(&config.store.dir, embedder).await?;
    Ok(Arc::new(store))
}

async fn run_init(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let count = store.count().await?;
    println!("store ready at {}", config.store.dir.display());
    println!("  indexed chunks: {}", count);
    Ok(())
}

async fn run_index(config: &Config, path: &PathBuf) -> Result<()> {
    let store = open_store(config).await?;
    let summary = index_path(&store, path, &config.chunking).await?;
    println!("index {}", path.display());
    println!("  files indexed: {}", summary.files);
    println!("  chunks written: {}", summary.chunks);
    println!("ok");
    Ok(())
}

async fn run_search(config: &Config, query: &str, k: Option<usize>, mode: &str) -> Result<()> {
    let store = open_store(config).await?;
    let k = k.unwrap_or(config.retrieval.final_k);

    let results = match mode {
        "dense" => store.dense_search(query, k).await?,
        "sparse" => store.sparse_search(query, k).await?,
        "hybrid" => {
            let retriever = HybridRetriever::new(store.clone(), &config.retrieval);
            let mut fused = retriever.retrieve(query, config.retrieval.candidate_k).await?;
            fused.truncate(k);
            fused
        }
        other => anyhow::bail!("Unknown search mode: {}. Use dense, sparse, or hybrid.", other),
    };

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            result.score,
            result.chunk.metadata.filename()
        );
        let excerpt: String = result.chunk.content.chars().take(160).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!("    id: {}", result.chunk.id);
        println!();
    }

    Ok(())
}

async fn run_context(config: &Config, query: &str) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let pipeline = HybridPipeline::new(config, store, embedder)?;

    let context = pipeline.answer_context(query).await?;

    if !context.has_local && !context.has_web {
        println!("No information found.");
        return Ok(());
    }

    println!("{}", context.text);
    println!();
    println!("sources:");
    for source in &context.sources {
        match source {
            SourceRecord::Local { filename } => println!("  [local] {}", filename),
            SourceRecord::Web {
                title,
                url,
                doc_type,
            } => println!("  [web] {} — {} ({})", title, url, doc_type),
        }
    }

    Ok(())
}

fn run_routes(config: &Config, query: &str) -> Result<()> {
    let router = SourceRouter::new(&config.routing, config.web.max_locators)?;

    let categories = router.classify(query);
    println!("categories: {}", categories.join(", "));

    let versions = router.extract_versions(query);
    for (product, version) in &versions {
        println!(
            "  version[{}]: {}",
            product,
            version.as_deref().unwrap_or("-")
        );
    }

    let locators = router.resolve_locators(&categories, &versions);
    println!("locators:");
    for locator in &locators {
        match &locator.version {
            Some(v) => println!("  {} ({} {})", locator.url, locator.category, v),
            None => println!("  {} ({})", locator.url, locator.category),
        }
    }

    Ok(())
}
