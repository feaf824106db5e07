//! The chain data source consumed by the pipeline.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{BlockRange, LogEntry, LogFilter, TransactionRecord};

/// Read access to a blockchain.
///
/// Implementations report failures as [`IndexerError::Fetch`]. Timeouts and
/// request chunking are the implementation's concern.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head block number.
    async fn chain_height(&self) -> Result<u64, IndexerError>;

    /// All logs in `range` matching any of `filters` (all logs when empty),
    /// ordered by block, transaction index, then log index.
    async fn get_logs(
        &self,
        range: BlockRange,
        filters: &[LogFilter],
    ) -> Result<Vec<LogEntry>, IndexerError>;

    /// Fetch a transaction by hash.
    async fn get_transaction(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionRecord>, IndexerError>;
}
