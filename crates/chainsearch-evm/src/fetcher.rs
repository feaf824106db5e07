//! EVM log and transaction fetcher.
//!
//! Uses JSON-RPC `eth_blockNumber`, `eth_getLogs` and `eth_getTransactionByHash`
//! behind the [`EvmRpcClient`] trait, and adapts them to the core
//! [`ChainSource`] with range chunking and multi-filter merging.

use async_trait::async_trait;
use futures::future;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainsearch_core::error::IndexerError;
use chainsearch_core::source::ChainSource;
use chainsearch_core::types::{BlockRange, LogEntry, LogFilter, TransactionRecord};

/// Default maximum block span of a single `eth_getLogs` call.
pub const DEFAULT_MAX_LOG_RANGE: u64 = 2_000;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(rename = "data")]
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "transactionIndex")]
    pub tx_index: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(rename = "removed")]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    pub fn into_entry(self) -> Result<LogEntry, IndexerError> {
        Ok(LogEntry {
            block_number: parse_hex_u64(&self.block_number)?,
            transaction_index: parse_hex_u32(&self.tx_index)?,
            log_index: parse_hex_u32(&self.log_index)?,
            address: self.address,
            topics: self.topics,
            data: self.data,
            block_hash: self.block_hash,
            transaction_hash: self.tx_hash,
        })
    }
}

/// A raw EVM transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    #[serde(rename = "transactionIndex")]
    pub tx_index: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub input: String,
    pub value: String,
}

impl RawTransaction {
    /// Convert to a core record. Pending transactions (no block) are rejected.
    pub fn into_record(self) -> Result<TransactionRecord, IndexerError> {
        let block = self.block_number.as_deref().ok_or_else(|| {
            IndexerError::Fetch(format!("transaction {} is still pending", self.hash))
        })?;
        Ok(TransactionRecord {
            block_number: parse_hex_u64(block)?,
            transaction_index: parse_hex_u32(self.tx_index.as_deref().unwrap_or("0x0"))?,
            value: parse_hex_u128(&self.value)?.to_string(),
            hash: self.hash,
            from: self.from,
            to: self.to,
            input: self.input,
        })
    }
}

/// Trait for fetching EVM data from a JSON-RPC provider.
///
/// Implementations wrap a transport of the caller's choice:
///
/// ```rust,ignore
/// #[async_trait]
/// impl EvmRpcClient for HttpClient {
///     async fn get_logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<RawLog>, IndexerError> {
///         let result = self
///             .call("eth_getLogs", logs_request_params(from, to, filter))
///             .await?;
///         serde_json::from_value(result).map_err(|e| IndexerError::Fetch(e.to_string()))
///     }
///     // get_block_number, get_transaction ...
/// }
/// ```
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, IndexerError>;
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, IndexerError>;
    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, IndexerError>;
}

/// `eth_getLogs` parameters for `[from, to]` and `filter`.
pub fn logs_request_params(from: u64, to: u64, filter: &LogFilter) -> Value {
    let mut params = json!({
        "fromBlock": format!("0x{from:x}"),
        "toBlock": format!("0x{to:x}"),
    });
    match filter.addresses.as_slice() {
        [] => {}
        [one] => params["address"] = json!(one),
        many => params["address"] = json!(many),
    }
    if !filter.topic0_values.is_empty() {
        params["topics"] = json!([filter.topic0_values]);
    }
    json!([params])
}

// ─── EvmChainSource ──────────────────────────────────────────────────────────

/// [`ChainSource`] over an [`EvmRpcClient`].
///
/// Ranges wider than `max_range` blocks are split into several calls. With
/// several filters, each filter is queried and the results merged into
/// (block, transaction index, log index) order without duplicates.
pub struct EvmChainSource<C> {
    client: C,
    max_range: u64,
}

impl<C: EvmRpcClient> EvmChainSource<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            max_range: DEFAULT_MAX_LOG_RANGE,
        }
    }

    pub fn with_max_range(mut self, max_range: u64) -> Self {
        self.max_range = max_range.max(1);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn logs_for(&self, range: BlockRange, filter: &LogFilter) -> Result<Vec<RawLog>, IndexerError> {
        let mut logs = Vec::new();
        for chunk in range.chunks(self.max_range) {
            logs.extend(self.client.get_logs(chunk.from(), chunk.to(), filter).await?);
        }
        Ok(logs)
    }
}

#[async_trait]
impl<C: EvmRpcClient> ChainSource for EvmChainSource<C> {
    async fn chain_height(&self) -> Result<u64, IndexerError> {
        self.client.get_block_number().await
    }

    async fn get_logs(
        &self,
        range: BlockRange,
        filters: &[LogFilter],
    ) -> Result<Vec<LogEntry>, IndexerError> {
        let all = LogFilter::default();
        let filters = if filters.is_empty() {
            std::slice::from_ref(&all)
        } else {
            filters
        };

        let batches =
            future::try_join_all(filters.iter().map(|f| self.logs_for(range, f))).await?;

        let mut entries = batches
            .into_iter()
            .flatten()
            .filter(|l| !l.is_removed())
            .map(RawLog::into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        if filters.len() > 1 {
            entries.sort_by_key(LogEntry::position);
            entries.dedup_by(|a, b| a.position() == b.position() && a.transaction_hash == b.transaction_hash);
        }
        tracing::debug!(%range, filters = filters.len(), logs = entries.len(), "Fetched logs");
        Ok(entries)
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<TransactionRecord>, IndexerError> {
        self.client
            .get_transaction(hash)
            .await?
            .map(RawTransaction::into_record)
            .transpose()
    }
}

// ─── Hex helpers ─────────────────────────────────────────────────────────────

fn strip_hex(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

/// Parse a hex-encoded string (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, IndexerError> {
    u64::from_str_radix(strip_hex(s), 16)
        .map_err(|e| IndexerError::Fetch(format!("malformed hex quantity {s:?}: {e}")))
}

fn parse_hex_u32(s: &str) -> Result<u32, IndexerError> {
    u32::from_str_radix(strip_hex(s), 16)
        .map_err(|e| IndexerError::Fetch(format!("malformed hex quantity {s:?}: {e}")))
}

fn parse_hex_u128(s: &str) -> Result<u128, IndexerError> {
    u128::from_str_radix(strip_hex(s), 16)
        .map_err(|e| IndexerError::Fetch(format!("malformed hex quantity {s:?}: {e}")))
}
