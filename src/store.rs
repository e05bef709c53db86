//! Persistent chunk store with dense and sparse lookup.
//!
//! Chunks live in SQLite: a `chunks` table for content + metadata, an
//! FTS5 virtual table for sparse (BM25) search, and a `chunk_vectors`
//! table of little-endian f32 BLOBs for dense search with cosine
//! similarity computed in Rust.
//!
//! Index mutation is a critical section: [`DocumentStore::index`] takes
//! a writer lock that excludes concurrent searches on the same store
//! instance (single-writer, multiple-reader).
//!
//! A missing or corrupt database is a recoverable condition: `open`
//! moves the bad file aside, logs a warning, and rebuilds an empty
//! store rather than failing startup.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::warn;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, Embedder};
use crate::error::StoreError;
use crate::models::{CandidateResult, Chunk, ChunkMetadata, RetrieverOrigin};

const DB_FILE: &str = "index.db";

pub struct DocumentStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    /// Writer gate: `index`/`clear` take write, searches take read.
    gate: RwLock<()>,
}

impl DocumentStore {
    /// Open (or create) the store persisted under `dir`.
    ///
    /// If the existing database cannot be opened or migrated, it is
    /// renamed aside and an empty store is created in its place.
    pub async fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        let db_path = dir.join(DB_FILE);

        let pool = match connect_and_migrate(&db_path).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(
                    "index at {} is unusable ({}); rebuilding an empty store",
                    db_path.display(),
                    e
                );
                move_aside(&db_path);
                connect_and_migrate(&db_path).await?
            }
        };

        Ok(Self {
            pool,
            embedder,
            gate: RwLock::new(()),
        })
    }

    /// Add chunks to both the dense and sparse indices.
    ///
    /// Every chunk is embedded exactly once here; stored chunks are
    /// never re-embedded or mutated. Re-indexing the same source simply
    /// inserts new rows — callers control re-indexing cadence.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&contents).await?;

        let _write = self.gate.write().await;
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, content, source, directory, file_type, page, chunk_seq, total_chunks)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.content)
            .bind(&chunk.metadata.source)
            .bind(&chunk.metadata.directory)
            .bind(&chunk.metadata.file_type)
            .bind(chunk.metadata.page)
            .bind(chunk.metadata.chunk_seq)
            .bind(chunk.metadata.total_chunks)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, content) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, embedding, model, dims) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Embedding-similarity search: the k nearest chunks by cosine
    /// similarity, descending, with chunk-id tie-break so a larger k
    /// never reorders the shared prefix.
    pub async fn dense_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateResult>, StoreError> {
        let _read = self.gate.read().await;

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.content, c.source, c.directory, c.file_type,
                   c.page, c.chunk_seq, c.total_chunks, v.embedding
            FROM chunk_vectors v
            JOIN chunks c ON c.id = v.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<CandidateResult> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64;
                CandidateResult {
                    chunk: row_to_chunk(row),
                    score: similarity,
                    origin: RetrieverOrigin::Dense,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates.truncate(k);

        Ok(candidates)
    }

    /// Term-frequency (BM25) search over the same corpus, independent
    /// of the dense index. An empty store or a query with no indexable
    /// terms yields an empty result, not an error.
    pub async fn sparse_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateResult>, StoreError> {
        let _read = self.gate.read().await;

        let match_query = match fts_match_query(query) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.content, c.source, c.directory, c.file_type,
                   c.page, c.chunk_seq, c.total_chunks, f.rank AS rank
            FROM (
                SELECT chunk_id, rank FROM chunks_fts WHERE chunks_fts MATCH ?
            ) f
            JOIN chunks c ON c.id = f.chunk_id
            ORDER BY f.rank, c.id
            LIMIT ?
            "#,
        )
        .bind(&match_query)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                CandidateResult {
                    chunk: row_to_chunk(row),
                    // FTS5 rank is ascending-better; negate so higher = better.
                    score: -rank,
                    origin: RetrieverOrigin::Sparse,
                }
            })
            .collect();

        Ok(candidates)
    }

    /// Number of indexed chunks.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Drop all indexed chunks (explicit index rebuild).
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _write = self.gate.write().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Close the underlying pool. Reopening from the same directory
    /// sees all indexed chunks.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn connect_and_migrate(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            directory TEXT,
            file_type TEXT,
            page INTEGER,
            chunk_seq INTEGER,
            total_chunks INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Rename an unusable database file (and its WAL/SHM siblings) out of
/// the way so a fresh one can be created.
fn move_aside(db_path: &Path) {
    let corrupt: PathBuf = db_path.with_extension("db.corrupt");
    let _ = std::fs::rename(db_path, &corrupt);
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(sidecar));
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        content: row.get("content"),
        metadata: ChunkMetadata {
            source: row.get("source"),
            directory: row.get("directory"),
            file_type: row.get("file_type"),
            page: row.get("page"),
            chunk_seq: row.get("chunk_seq"),
            total_chunks: row.get("total_chunks"),
        },
    }
}

/// Rewrite a natural-language query as an FTS5 OR-query of quoted
/// terms. Raw user input can contain FTS syntax characters (quotes,
/// hyphens, question marks) that would otherwise be parse errors.
fn fts_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
