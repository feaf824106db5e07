//! File-backed JSON progress store.
//!
//! Each progress stream is one small JSON record at
//! `<dir>/<stream_id>_progress.json`. Saves write a temporary sibling file
//! and rename it over the record, so a crash never leaves a torn checkpoint.
//! The file and its directory are synced before `save` returns.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use chainsearch_core::checkpoint::{Checkpoint, ProgressStore};
use chainsearch_core::error::IndexerError;

/// Progress store keeping one JSON file per stream in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileProgressStore {
    dir: PathBuf,
}

impl JsonFileProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store records in the OS temporary directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `stream_id`.
    pub fn path_for(&self, stream_id: &str) -> PathBuf {
        self.dir.join(format!("{stream_id}_progress.json"))
    }
}

/// Write `raw` to `path` and flush it to disk.
async fn write_synced(path: &Path, raw: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(raw).await?;
    file.sync_all().await
}

/// Persist the directory entry of a rename.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl ProgressStore for JsonFileProgressStore {
    async fn load(&self, stream_id: &str) -> Result<Option<Checkpoint>, IndexerError> {
        let path = self.path_for(stream_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IndexerError::Storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| IndexerError::Storage(format!("corrupt progress record {}: {e}", path.display())))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let path = self.path_for(&checkpoint.stream_id);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| IndexerError::Storage(format!("cannot create {}: {e}", self.dir.display())))?;
        write_synced(&tmp, &raw)
            .await
            .map_err(|e| IndexerError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| IndexerError::Storage(format!("cannot replace {}: {e}", path.display())))?;
        sync_dir(&self.dir)
            .await
            .map_err(|e| IndexerError::Storage(format!("cannot sync {}: {e}", self.dir.display())))?;

        debug!(
            stream = %checkpoint.stream_id,
            block = checkpoint.last_block_processed,
            path = %path.display(),
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, stream_id: &str) -> Result<(), IndexerError> {
        let path = self.path_for(stream_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexerError::Storage(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }
}
