//! SQLite storage backend for ChainSearch.
//!
//! Persists progress checkpoints, index schemas and search documents to a
//! single SQLite file. Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use chainsearch_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./search.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainsearch_core::checkpoint::{Checkpoint, ProgressStore};
use chainsearch_core::error::IndexerError;
use chainsearch_core::search::{IndexSchema, SearchBackend, SearchDocument};

/// SQLite-backed progress store and search index.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./search.db"`) or a full
    /// SQLite URL (`"sqlite:./search.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Uses a single connection so every query sees the same database.
    /// All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_progress (
                stream_id            TEXT    PRIMARY KEY,
                last_block_processed INTEGER NOT NULL,
                updated_at           INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS search_indexes (
                name        TEXT PRIMARY KEY,
                schema_json TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        // rowid keeps first-write order across upserts
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS search_documents (
                index_name  TEXT NOT NULL,
                doc_id      TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                UNIQUE (index_name, doc_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    // ─── Document queries ────────────────────────────────────────────────────────

    /// Documents of `index` in first-write order.
    pub async fn documents(&self, index: &str) -> Result<Vec<SearchDocument>, IndexerError> {
        let rows = sqlx::query(
            "SELECT doc_id, fields_json FROM search_documents
             WHERE index_name = ? ORDER BY rowid",
        )
        .bind(index)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get("fields_json");
            let fields: Map<String, Value> = serde_json::from_str(&raw)
                .map_err(|e| IndexerError::Storage(format!("corrupt document: {e}")))?;
            docs.push(SearchDocument {
                id: row.get("doc_id"),
                fields,
            });
        }
        Ok(docs)
    }

    /// Schema an index was created with.
    pub async fn schema(&self, index: &str) -> Result<Option<IndexSchema>, IndexerError> {
        let row = sqlx::query("SELECT schema_json FROM search_indexes WHERE name = ?")
            .bind(index)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| {
            let raw: String = r.get("schema_json");
            serde_json::from_str(&raw)
                .map_err(|e| IndexerError::Storage(format!("corrupt schema: {e}")))
        })
        .transpose()
    }
}

// ─── ProgressStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl ProgressStore for SqliteStorage {
    async fn load(&self, stream_id: &str) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT stream_id, last_block_processed, updated_at
             FROM block_progress WHERE stream_id = ?",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| Checkpoint {
            stream_id: r.get("stream_id"),
            last_block_processed: r.get::<i64, _>("last_block_processed") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO block_progress
             (stream_id, last_block_processed, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&checkpoint.stream_id)
        .bind(checkpoint.last_block_processed as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(
            stream = %checkpoint.stream_id,
            block = checkpoint.last_block_processed,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, stream_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM block_progress WHERE stream_id = ?")
            .bind(stream_id)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }
}

// ─── SearchBackend impl ──────────────────────────────────────────────────────

#[async_trait]
impl SearchBackend for SqliteStorage {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexerError> {
        let row = sqlx::query("SELECT 1 FROM search_indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexerError> {
        let raw = serde_json::to_string(schema).map_err(|e| IndexerError::Storage(e.to_string()))?;
        sqlx::query("INSERT OR IGNORE INTO search_indexes (name, schema_json) VALUES (?, ?)")
            .bind(&schema.name)
            .bind(&raw)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn write_batch(&self, index: &str, documents: &[SearchDocument]) -> Result<(), IndexerError> {
        if !self.index_exists(index).await? {
            return Err(IndexerError::Storage(format!("index {index} does not exist")));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        for doc in documents {
            let fields = serde_json::to_string(&doc.fields)
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO search_documents (index_name, doc_id, fields_json)
                 VALUES (?, ?, ?)
                 ON CONFLICT (index_name, doc_id) DO UPDATE SET fields_json = excluded.fields_json",
            )
            .bind(index)
            .bind(&doc.id)
            .bind(&fields)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(index, documents = documents.len(), "documents stored");
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM search_documents WHERE index_name = ?")
            .bind(index)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    async fn delete_index(&self, name: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM search_documents WHERE index_name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query("DELETE FROM search_indexes WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(index = name, "index deleted");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
