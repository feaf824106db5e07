//! Block progress services decide the next range and advance the checkpoint.
//!
//! Two policies are provided:
//! - [`LiveBlockProgressService`] follows the chain tip minus a confirmation depth.
//! - [`StaticBlockProgressService`] walks a fixed `[from, to]` range.
//!
//! Both start at `max(from, checkpoint + 1)` and never hand out more than
//! `max_blocks_per_batch` blocks per range.

use std::sync::Arc;

use async_trait::async_trait;

use crate::checkpoint::{Checkpoint, ProgressStore};
use crate::error::IndexerError;
use crate::reorg::HeadMonitor;
use crate::source::ChainSource;
use crate::types::BlockRange;

/// Computes ranges to process and persists progress after each one.
#[async_trait]
pub trait BlockProgressService: Send {
    /// The next range to process, or `None` if there is nothing new.
    async fn next_range(&mut self) -> Result<Option<BlockRange>, IndexerError>;

    /// Persist `range.to()` as the last processed block.
    ///
    /// Fails with [`IndexerError::CheckpointPersist`] if the write is not durable.
    async fn advance(&mut self, range: BlockRange) -> Result<(), IndexerError>;
}

// ─── Shared checkpoint access ─────────────────────────────────────────────────

/// Checkpoint reads and writes for one progress stream.
struct StreamProgress {
    store: Arc<dyn ProgressStore>,
    stream_id: String,
    from: u64,
}

impl StreamProgress {
    /// First block not yet processed; `None` once `u64::MAX` is checkpointed.
    async fn next_block(&self) -> Result<Option<u64>, IndexerError> {
        let checkpoint = self.store.load(&self.stream_id).await?;
        Ok(match checkpoint {
            None => Some(self.from),
            Some(cp) => cp
                .last_block_processed
                .checked_add(1)
                .map(|next| next.max(self.from)),
        })
    }

    async fn advance(&self, range: BlockRange) -> Result<(), IndexerError> {
        self.store
            .save(Checkpoint::new(&self.stream_id, range.to()))
            .await
            .map_err(|e| IndexerError::CheckpointPersist {
                stream: self.stream_id.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(stream = %self.stream_id, block = range.to(), "Checkpoint saved");
        Ok(())
    }
}

fn batch_end(start: u64, max_blocks_per_batch: u64, limit: u64) -> u64 {
    start
        .saturating_add(max_blocks_per_batch.max(1) - 1)
        .min(limit)
}

// ─── Live-tip policy ──────────────────────────────────────────────────────────

/// Follows the chain head, staying `minimum_confirmations` blocks behind it.
pub struct LiveBlockProgressService {
    progress: StreamProgress,
    source: Arc<dyn ChainSource>,
    minimum_confirmations: u64,
    max_blocks_per_batch: u64,
    head: HeadMonitor,
}

impl LiveBlockProgressService {
    pub fn new(
        source: Arc<dyn ChainSource>,
        store: Arc<dyn ProgressStore>,
        stream_id: impl Into<String>,
        from: u64,
        minimum_confirmations: u64,
        max_blocks_per_batch: u64,
    ) -> Self {
        Self {
            progress: StreamProgress {
                store,
                stream_id: stream_id.into(),
                from,
            },
            source,
            minimum_confirmations,
            max_blocks_per_batch,
            head: HeadMonitor::new(minimum_confirmations),
        }
    }
}

#[async_trait]
impl BlockProgressService for LiveBlockProgressService {
    async fn next_range(&mut self) -> Result<Option<BlockRange>, IndexerError> {
        let Some(next) = self.progress.next_block().await? else {
            return Ok(None);
        };

        let head = self.source.chain_height().await?;
        self.head.observe(head)?;

        // Head below the confirmation depth: no block is confirmed yet
        let Some(safe_head) = head.checked_sub(self.minimum_confirmations) else {
            return Ok(None);
        };
        if safe_head < next {
            return Ok(None);
        }

        Ok(BlockRange::new(
            next,
            batch_end(next, self.max_blocks_per_batch, safe_head),
        ))
    }

    async fn advance(&mut self, range: BlockRange) -> Result<(), IndexerError> {
        self.progress.advance(range).await?;
        self.head.advanced(range.to());
        Ok(())
    }
}

// ─── Static-range policy ──────────────────────────────────────────────────────

/// Walks a fixed `[from, to]` range and then reports no more work.
pub struct StaticBlockProgressService {
    progress: StreamProgress,
    to: u64,
    max_blocks_per_batch: u64,
}

impl StaticBlockProgressService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        stream_id: impl Into<String>,
        from: u64,
        to: u64,
        max_blocks_per_batch: u64,
    ) -> Self {
        Self {
            progress: StreamProgress {
                store,
                stream_id: stream_id.into(),
                from,
            },
            to,
            max_blocks_per_batch,
        }
    }
}

#[async_trait]
impl BlockProgressService for StaticBlockProgressService {
    async fn next_range(&mut self) -> Result<Option<BlockRange>, IndexerError> {
        let Some(next) = self.progress.next_block().await? else {
            return Ok(None);
        };
        if next > self.to {
            return Ok(None);
        }
        Ok(BlockRange::new(
            next,
            batch_end(next, self.max_blocks_per_batch, self.to),
        ))
    }

    async fn advance(&mut self, range: BlockRange) -> Result<(), IndexerError> {
        self.progress.advance(range).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
