//! Error types for the chainsearch pipeline.

use thiserror::Error;

/// Errors that can occur while processing block ranges.
///
/// Every kind aborts the current range and is surfaced unchanged to the
/// caller of `process`. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The chain data source was unreachable or returned malformed data.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A handler or index write failed for a matched log.
    #[error("Dispatch error in '{handler}': {reason}")]
    Dispatch { handler: String, reason: String },

    /// The progress checkpoint could not be persisted.
    #[error("Checkpoint persist error for stream '{stream}': {reason}")]
    CheckpointPersist { stream: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The chain head moved back below blocks this run already checkpointed.
    #[error(
        "Chain reorg detected: head moved from {previous_head} to {current_head}, \
         below checkpoint {checkpoint}"
    )]
    ChainReorg {
        previous_head: u64,
        current_head: u64,
        checkpoint: u64,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Wrap a failure raised while `handler` processed matched logs.
    ///
    /// Fetch, dispatch and reorg errors keep their kind; everything else
    /// becomes a `Dispatch` error attributed to `handler`.
    pub fn dispatch(handler: impl Into<String>, err: IndexerError) -> Self {
        match err {
            e @ (Self::Fetch(_) | Self::Dispatch { .. } | Self::ChainReorg { .. }) => e,
            other => Self::Dispatch {
                handler: handler.into(),
                reason: other.to_string(),
            },
        }
    }

    /// Returns `true` if the data source failed.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns `true` if a handler or index write failed.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. })
    }

    /// Returns `true` if the checkpoint could not be persisted.
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, Self::CheckpointPersist { .. })
    }
}
