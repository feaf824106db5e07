//! Batch processor: drives range computation, dispatch and checkpointing.
//!
//! ```text
//! Idle → ComputingRange → FetchingAndDispatching → Advancing → Idle
//! Idle → Done        (bounded mode, no range left)
//! Idle → Cancelled   (cancellation observed between ranges)
//! any  → Failed      (error surfaced to the caller)
//! ```
//!
//! Cancellation is only observed at `Idle`. A range that has started always
//! runs to completion or failure, so no range is indexed without being
//! checkpointed because of a cancellation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;
use crate::log_processor::BlockchainLogProcessor;
use crate::progress::BlockProgressService;
use crate::types::BlockRange;

/// Called after each processed range with `(sequence number, range)`.
pub type RangeCallback = Box<dyn FnMut(u32, BlockRange) + Send>;

/// Runtime state of the batch processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Idle,
    ComputingRange,
    FetchingAndDispatching,
    Advancing,
    /// Bounded run finished.
    Done,
    /// Cancellation observed between ranges.
    Cancelled,
    /// A range failed; the checkpoint stayed at its pre-range value.
    Failed,
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ComputingRange => write!(f, "computing-range"),
            Self::FetchingAndDispatching => write!(f, "fetching-and-dispatching"),
            Self::Advancing => write!(f, "advancing"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Runs one progress stream: one range at a time, never concurrently.
pub struct BatchProcessor {
    log_processor: BlockchainLogProcessor,
    progress: Box<dyn BlockProgressService>,
    poll_interval: Duration,
    state: BatchState,
}

impl BatchProcessor {
    pub fn new(
        log_processor: BlockchainLogProcessor,
        progress: Box<dyn BlockProgressService>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            log_processor,
            progress,
            poll_interval,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Process the next range, if any, and advance the checkpoint.
    ///
    /// Returns the processed range, or `None` if there was nothing new.
    pub async fn process_once(&mut self) -> Result<Option<BlockRange>, IndexerError> {
        let result = self.step().await;
        self.state = match &result {
            Ok(_) => BatchState::Idle,
            Err(_) => BatchState::Failed,
        };
        result
    }

    async fn step(&mut self) -> Result<Option<BlockRange>, IndexerError> {
        self.state = BatchState::ComputingRange;
        let Some(range) = self.progress.next_range().await? else {
            return Ok(None);
        };

        self.state = BatchState::FetchingAndDispatching;
        let stats = self.log_processor.process(range).await.map_err(|e| {
            tracing::error!(%range, error = %e, "Range aborted");
            e
        })?;

        self.state = BatchState::Advancing;
        self.progress.advance(range).await.map_err(|e| {
            tracing::error!(%range, error = %e, "Checkpoint not persisted");
            e
        })?;

        tracing::info!(
            %range,
            blocks = range.count(),
            logs = stats.logs,
            dispatched = stats.dispatched,
            "Range processed"
        );
        Ok(Some(range))
    }

    /// Process ranges until none is left (bounded mode) or `cancel` fires.
    ///
    /// Returns the total number of blocks processed.
    pub async fn process_range(
        &mut self,
        cancel: &CancellationToken,
        mut on_range: Option<RangeCallback>,
    ) -> Result<u64, IndexerError> {
        let mut ranges = 0u32;
        let mut blocks = 0u64;
        loop {
            if cancel.is_cancelled() {
                self.state = BatchState::Cancelled;
                tracing::info!(ranges, blocks, "Processing cancelled");
                return Ok(blocks);
            }
            match self.process_once().await? {
                Some(range) => {
                    ranges += 1;
                    blocks += range.count();
                    if let Some(cb) = on_range.as_mut() {
                        cb(ranges, range);
                    }
                }
                None => {
                    self.state = BatchState::Done;
                    tracing::info!(ranges, blocks, "Block range complete");
                    return Ok(blocks);
                }
            }
        }
    }

    /// Process ranges until `cancel` fires, waiting `poll_interval` whenever
    /// no new confirmed range is available.
    ///
    /// Returns the total number of blocks processed.
    pub async fn process_continually(
        &mut self,
        cancel: &CancellationToken,
        mut on_range: Option<RangeCallback>,
    ) -> Result<u64, IndexerError> {
        let mut ranges = 0u32;
        let mut blocks = 0u64;
        loop {
            if cancel.is_cancelled() {
                self.state = BatchState::Cancelled;
                tracing::info!(ranges, blocks, "Processing cancelled");
                return Ok(blocks);
            }
            match self.process_once().await? {
                Some(range) => {
                    ranges += 1;
                    blocks += range.count();
                    if let Some(cb) = on_range.as_mut() {
                        cb(ranges, range);
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }
}
