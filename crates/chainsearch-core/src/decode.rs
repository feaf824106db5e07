//! Caller-supplied decoders for events and function calls.
//!
//! The pipeline never interprets ABI data itself. Each indexable event or
//! function type implements one of these traits, and the pipeline calls it
//! for logs (or transactions) whose signature matches.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::search::IndexField;
use crate::types::{LogEntry, TransactionRecord};

/// A typed event that can be decoded from a log entry.
pub trait EventDecode: Sized + Send + Sync + 'static {
    /// Event name (e.g. `"Transfer"`), also the default index name.
    const NAME: &'static str;

    /// Topic0 signature hash (`0x…`).
    const SIGNATURE: &'static str;

    /// Decode the event from a log whose topic0 matches [`Self::SIGNATURE`].
    fn decode(log: &LogEntry) -> Result<Self, IndexerError>;

    /// Schema fields describing the decoded event in the search index.
    fn index_fields() -> Vec<IndexField> {
        Vec::new()
    }

    /// Returns `true` if `log` carries this event.
    fn is_log_for_event(log: &LogEntry) -> bool {
        log.topic0()
            .is_some_and(|t| t.eq_ignore_ascii_case(Self::SIGNATURE))
    }
}

/// A typed function call that can be decoded from transaction calldata.
pub trait FunctionDecode: Sized + Send + Sync + 'static {
    /// Function name (e.g. `"transfer"`), also the default index name.
    const NAME: &'static str;

    /// Four-byte selector (`0x` + 8 hex chars).
    const SELECTOR: &'static str;

    /// Decode the call from a transaction whose input starts with [`Self::SELECTOR`].
    fn decode(tx: &TransactionRecord) -> Result<Self, IndexerError>;

    fn index_fields() -> Vec<IndexField> {
        Vec::new()
    }
}

/// A decoded event together with the log it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog<E> {
    pub event: E,
    pub log: LogEntry,
}

impl<E: EventDecode> EventLog<E> {
    pub fn decode(log: &LogEntry) -> Result<Self, IndexerError> {
        Ok(Self {
            event: E::decode(log)?,
            log: log.clone(),
        })
    }
}

/// A decoded function call together with its transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallLog<F> {
    pub call: F,
    pub transaction: TransactionRecord,
}

impl<F: FunctionDecode> FunctionCallLog<F> {
    pub fn decode(tx: &TransactionRecord) -> Result<Self, IndexerError> {
        Ok(Self {
            call: F::decode(tx)?,
            transaction: tx.clone(),
        })
    }
}
