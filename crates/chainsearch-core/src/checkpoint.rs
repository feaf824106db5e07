//! Durable progress checkpoints.
//!
//! A checkpoint stores the last block whose range was fully dispatched,
//! keyed by a progress-stream identity. On restart, processing resumes from
//! the block after it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::IndexerError;

/// A persisted checkpoint for one progress stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Progress-stream identity (e.g. `"erc20_transfers"`).
    pub stream_id: String,
    /// Last successfully processed block number.
    pub last_block_processed: u64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn new(stream_id: impl Into<String>, last_block_processed: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            last_block_processed,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Trait for storing and loading checkpoints.
///
/// Implementations include `MemoryProgressStore`, `JsonFileProgressStore`
/// and `SqliteStorage`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the checkpoint for a stream (`None` if it does not exist yet).
    async fn load(&self, stream_id: &str) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint. Must be durable when this returns `Ok`.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting progress).
    async fn delete(&self, stream_id: &str) -> Result<(), IndexerError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory progress store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryProgressStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stream with an initial checkpoint.
    pub fn with_checkpoint(self, stream_id: &str, last_block_processed: u64) -> Self {
        if let Ok(mut data) = self.data.lock() {
            data.insert(
                stream_id.to_string(),
                Checkpoint::new(stream_id, last_block_processed),
            );
        }
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Checkpoint>>, IndexerError> {
        self.data
            .lock()
            .map_err(|e| IndexerError::Storage(format!("progress store poisoned: {e}")))
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, stream_id: &str) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self.lock()?.get(stream_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        self.lock()?.insert(checkpoint.stream_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, stream_id: &str) -> Result<(), IndexerError> {
        self.lock()?.remove(stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryProgressStore::new();

        // No checkpoint initially
        assert!(store.load("transfers").await.unwrap().is_none());

        store.save(Checkpoint::new("transfers", 1000)).await.unwrap();

        let cp = store.load("transfers").await.unwrap().unwrap();
        assert_eq!(cp.last_block_processed, 1000);
        assert_eq!(cp.stream_id, "transfers");

        // Streams are isolated
        assert!(store.load("approvals").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_delete() {
        let store = MemoryProgressStore::new().with_checkpoint("transfers", 42);
        assert!(store.load("transfers").await.unwrap().is_some());
        store.delete("transfers").await.unwrap();
        assert!(store.load("transfers").await.unwrap().is_none());
    }
}
