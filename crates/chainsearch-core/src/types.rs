//! Shared types for the processing pipeline.

use serde::{Deserialize, Serialize};

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive `[from, to]` span of block numbers processed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    from: u64,
    to: u64,
}

impl BlockRange {
    /// Create a range, or `None` if `from > to`.
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// A range covering exactly one block.
    pub fn single(block: u64) -> Self {
        Self { from: block, to: block }
    }

    /// First block (inclusive).
    pub fn from(&self) -> u64 {
        self.from
    }

    /// Last block (inclusive).
    pub fn to(&self) -> u64 {
        self.to
    }

    /// Number of blocks in the range.
    pub fn count(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }

    /// Split into consecutive sub-ranges of at most `max_len` blocks.
    pub fn chunks(&self, max_len: u64) -> Vec<BlockRange> {
        let max_len = max_len.max(1);
        let mut out = Vec::new();
        let mut start = self.from;
        loop {
            let end = start.saturating_add(max_len - 1).min(self.to);
            out.push(BlockRange { from: start, to: end });
            if end == self.to {
                break;
            }
            start = end + 1;
        }
        out
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ─── LogEntry ─────────────────────────────────────────────────────────────────

/// A log entry as returned by the chain data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract address (`0x…`).
    pub address: String,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<String>,
    /// Non-indexed data (`0x…`).
    pub data: String,
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: u32,
    pub log_index: u32,
}

impl LogEntry {
    /// The event signature topic, if any.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }

    /// Sort key: block, then transaction index, then log index.
    pub fn position(&self) -> (u64, u32, u32) {
        (self.block_number, self.transaction_index, self.log_index)
    }

    /// Stable document identity for this log.
    pub fn key(&self) -> String {
        format!("{}_{}", self.transaction_hash, self.log_index)
    }
}

// ─── LogFilter ────────────────────────────────────────────────────────────────

/// Filter for which logs to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Only logs from these contract addresses (empty = all addresses).
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Only logs with one of these topic[0] values (empty = all events).
    #[serde(default)]
    pub topic0_values: Vec<String>,
}

impl LogFilter {
    /// Create a filter for a single contract address.
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            addresses: vec![addr.into()],
            ..Default::default()
        }
    }

    /// Add a topic0 filter (event signature hash).
    pub fn topic0(mut self, topic: impl Into<String>) -> Self {
        self.topic0_values.push(topic.into());
        self
    }

    /// Returns `true` if `address` matches this filter.
    pub fn matches_address(&self, address: &str) -> bool {
        self.addresses.is_empty()
            || self.addresses.iter().any(|a| a.eq_ignore_ascii_case(address))
    }

    /// Returns `true` if `topic0` matches this filter.
    pub fn matches_topic0(&self, topic0: &str) -> bool {
        self.topic0_values.is_empty()
            || self.topic0_values.iter().any(|t| t.eq_ignore_ascii_case(topic0))
    }

    pub fn matches(&self, log: &LogEntry) -> bool {
        self.matches_address(&log.address)
            && match log.topic0() {
                Some(t) => self.matches_topic0(t),
                None => self.topic0_values.is_empty(),
            }
    }
}

// ─── TransactionRecord ────────────────────────────────────────────────────────

/// The transaction that emitted a log, used for function-call decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub block_number: u64,
    pub transaction_index: u32,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Calldata (`0x…`).
    pub input: String,
    /// Value in wei, decimal.
    pub value: String,
}

impl TransactionRecord {
    /// Returns `true` if the calldata starts with `selector` (`0x` + 8 hex chars).
    pub fn calls(&self, selector: &str) -> bool {
        match (self.input.get(..selector.len()), selector.len()) {
            (Some(prefix), 10) => prefix.eq_ignore_ascii_case(selector),
            _ => false,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn log(address: &str, topic0: Option<&str>) -> LogEntry {
        LogEntry {
            address: address.into(),
            topics: topic0.into_iter().map(String::from).collect(),
            data: "0x".into(),
            block_number: 1,
            block_hash: "0xb1".into(),
            transaction_hash: "0xt1".into(),
            transaction_index: 0,
            log_index: 3,
        }
    }

    #[test]
    fn block_range_count() {
        assert_eq!(BlockRange::new(101, 102).unwrap().count(), 2);
        assert_eq!(BlockRange::single(105).count(), 1);
        assert!(BlockRange::new(5, 4).is_none());
    }

    #[test]
    fn block_range_chunks() {
        let chunks = BlockRange::new(10, 24).unwrap().chunks(5);
        assert_eq!(
            chunks,
            vec![
                BlockRange::new(10, 14).unwrap(),
                BlockRange::new(15, 19).unwrap(),
                BlockRange::new(20, 24).unwrap(),
            ]
        );
        assert_eq!(BlockRange::single(7).chunks(100), vec![BlockRange::single(7)]);
    }

    #[test]
    fn block_range_chunks_at_u64_max() {
        let range = BlockRange::new(u64::MAX - 2, u64::MAX).unwrap();
        assert_eq!(range.chunks(2).len(), 2);
    }

    #[test]
    fn log_filter_matches_address() {
        let f = LogFilter::address("0xAbCdEf");
        assert!(f.matches(&log("0xabcdef", Some("0x01")))); // case-insensitive
        assert!(!f.matches(&log("0x111111", Some("0x01"))));
    }

    #[test]
    fn log_filter_topic0() {
        let f = LogFilter::default().topic0("0xDDF2");
        assert!(f.matches(&log("0x1", Some("0xddf2"))));
        assert!(!f.matches(&log("0x1", Some("0x8c5b"))));
        assert!(!f.matches(&log("0x1", None)));
    }

    #[test]
    fn log_filter_empty_matches_all() {
        let f = LogFilter::default();
        assert!(f.matches(&log("0xanything", None)));
    }

    #[test]
    fn transaction_selector_match() {
        let tx = TransactionRecord {
            hash: "0xt".into(),
            block_number: 1,
            transaction_index: 0,
            from: "0xf".into(),
            to: Some("0xc".into()),
            input: "0xA9059CBB0000".into(),
            value: "0".into(),
        };
        assert!(tx.calls("0xa9059cbb"));
        assert!(!tx.calls("0x23b872dd"));
        assert!(!tx.calls("0xa9"));
    }
}
