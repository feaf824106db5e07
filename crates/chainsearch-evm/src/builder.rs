//! Fluent builder API for creating EVM event-indexing processors.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainsearch_evm::ProcessorBuilder;
//! use chainsearch_core::types::LogFilter;
//!
//! let config = ProcessorBuilder::new()
//!     .stream_id("usdc-transfers")
//!     .minimum_confirmations(12)
//!     .max_blocks_per_batch(500)
//!     .filter(LogFilter::address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))
//!     .build_config();
//! ```

use std::sync::Arc;

use chainsearch_core::checkpoint::ProgressStore;
use chainsearch_core::config::ProcessorConfig;
use chainsearch_core::error::IndexerError;
use chainsearch_core::orchestrator::EventIndexingProcessor;
use chainsearch_core::search::SearchService;
use chainsearch_core::types::LogFilter;

use crate::fetcher::{EvmChainSource, EvmRpcClient};

/// Fluent builder for `ProcessorConfig`.
#[derive(Default)]
pub struct ProcessorBuilder {
    config: ProcessorConfig,
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
        }
    }

    /// Set the progress-stream ID (used as the checkpoint key).
    pub fn stream_id(mut self, id: impl Into<String>) -> Self {
        self.config.stream_id = id.into();
        self
    }

    /// Set the number of blocks fetched and dispatched per range.
    pub fn max_blocks_per_batch(mut self, blocks: u64) -> Self {
        self.config.max_blocks_per_batch = blocks;
        self
    }

    /// Set confirmation depth (blocks behind head before processing).
    pub fn minimum_confirmations(mut self, depth: u64) -> Self {
        self.config.minimum_confirmations = depth;
        self
    }

    /// Set live mode polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Add a log filter. Logs matching any filter are fetched.
    pub fn filter(mut self, filter: LogFilter) -> Self {
        self.config.filters.push(filter);
        self
    }

    /// Build the `ProcessorConfig`.
    pub fn build_config(self) -> ProcessorConfig {
        self.config
    }

    /// Build a processor reading from `client`, indexing into `search` and
    /// checkpointing into `store`.
    pub fn build<C: EvmRpcClient + 'static>(
        self,
        client: C,
        search: Arc<SearchService>,
        store: Arc<dyn ProgressStore>,
    ) -> Result<EventIndexingProcessor, IndexerError> {
        let source = Arc::new(EvmChainSource::new(client));
        EventIndexingProcessor::new(self.config, source, search, store)
    }
}
