//! Fetch the logs of one block range and dispatch them to log processors.

use std::sync::Arc;

use crate::error::IndexerError;
use crate::handler::LogProcessor;
use crate::source::ChainSource;
use crate::types::{BlockRange, LogEntry, LogFilter};

/// Outcome of dispatching one range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeStats {
    /// Logs returned by the data source.
    pub logs: usize,
    /// Log deliveries across all processors.
    pub dispatched: usize,
}

/// Retrieves logs for a range and invokes each matching processor once per log.
pub struct BlockchainLogProcessor {
    source: Arc<dyn ChainSource>,
    processors: Vec<Arc<dyn LogProcessor>>,
    filters: Vec<LogFilter>,
}

impl BlockchainLogProcessor {
    pub fn new(
        source: Arc<dyn ChainSource>,
        processors: Vec<Arc<dyn LogProcessor>>,
        filters: Vec<LogFilter>,
    ) -> Self {
        Self {
            source,
            processors,
            filters,
        }
    }

    /// Fetch and dispatch all logs in `range`.
    ///
    /// Each processor receives its matching logs in the order the source
    /// returned them. A range with no matching logs is a success.
    pub async fn process(&self, range: BlockRange) -> Result<RangeStats, IndexerError> {
        let logs = self.source.get_logs(range, &self.filters).await?;

        if let Some(stray) = logs.iter().find(|l| !range.contains(l.block_number)) {
            return Err(IndexerError::Fetch(format!(
                "log {} at block {} outside requested range {range}",
                stray.key(),
                stray.block_number
            )));
        }

        let mut dispatched = 0;
        for processor in &self.processors {
            let matching: Vec<LogEntry> = logs
                .iter()
                .filter(|l| processor.is_log_for_event(l))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            processor
                .process_logs(&matching)
                .await
                .map_err(|e| IndexerError::dispatch(processor.name(), e))?;
            dispatched += matching.len();
        }

        Ok(RangeStats {
            logs: logs.len(),
            dispatched,
        })
    }
}
