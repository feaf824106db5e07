//! Processor configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::LogFilter;

/// Configuration for an [`EventIndexingProcessor`](crate::EventIndexingProcessor) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Progress-stream identity (used as the checkpoint key).
    pub stream_id: String,
    /// Maximum number of blocks fetched and dispatched as one range.
    pub max_blocks_per_batch: u64,
    /// Number of blocks behind the chain head considered safe from reorgs.
    pub minimum_confirmations: u64,
    /// Live-mode wait when no new confirmed range is available (milliseconds).
    pub poll_interval_ms: u64,
    /// Log filters applied to every fetch (empty = all logs).
    pub filters: Vec<LogFilter>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            stream_id: "event_indexing".into(),
            max_blocks_per_batch: 2,
            minimum_confirmations: 0,
            poll_interval_ms: 2000,
            filters: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IndexerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IndexerError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            IndexerError::Configuration(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.stream_id.trim().is_empty() {
            return Err(IndexerError::Configuration("stream_id must not be empty".into()));
        }
        if self
            .stream_id
            .chars()
            .any(|c| matches!(c, '/' | '\\') || c.is_control())
            || self.stream_id.contains("..")
        {
            return Err(IndexerError::Configuration(format!(
                "stream_id {:?} must not contain path separators or '..'",
                self.stream_id
            )));
        }
        if self.max_blocks_per_batch == 0 {
            return Err(IndexerError::Configuration(
                "max_blocks_per_batch must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = ProcessorConfig::default();
        assert_eq!(cfg.max_blocks_per_batch, 2);
        assert_eq!(cfg.minimum_confirmations, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_batch_size_rejected() {
        let cfg = ProcessorConfig {
            max_blocks_per_batch: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(IndexerError::Configuration(_))));
    }

    #[test]
    fn stream_id_must_be_a_plain_name() {
        for bad in ["../escape", "nested/stream", "win\\stream", ".."] {
            let cfg = ProcessorConfig {
                stream_id: bad.into(),
                ..Default::default()
            };
            assert!(
                matches!(cfg.validate(), Err(IndexerError::Configuration(_))),
                "{bad} accepted"
            );
        }
        let cfg = ProcessorConfig {
            stream_id: "usdc.transfers-v2".into(),
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn loads_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stream_id": "usdc", "minimum_confirmations": 12,
                "filters": [{{"addresses": ["0xA0b8"]}}]}}"#
        )
        .unwrap();

        let cfg = ProcessorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.stream_id, "usdc");
        assert_eq!(cfg.minimum_confirmations, 12);
        assert_eq!(cfg.max_blocks_per_batch, 2);
        assert_eq!(cfg.filters[0].addresses, vec!["0xA0b8".to_string()]);
    }
}
