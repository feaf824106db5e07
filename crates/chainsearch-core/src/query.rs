//! Classification of free-text search input.

use serde::{Deserialize, Serialize};

/// What a search query most likely refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Block,
    Transaction,
    Address,
    Unknown,
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::Transaction => write!(f, "transaction"),
            Self::Address => write!(f, "address"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        return false;
    };
    hex.len() == len && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Infer the search type of `query`.
///
/// - decimal number that fits in `u64` → block
/// - `0x` + 64 hex chars → transaction hash
/// - `0x` + 40 hex chars → address
pub fn infer_search_type(query: &str) -> SearchType {
    let q = query.trim();
    if q.is_empty() {
        return SearchType::Unknown;
    }
    if q.bytes().all(|b| b.is_ascii_digit()) && q.parse::<u64>().is_ok() {
        return SearchType::Block;
    }
    if is_hex_of_len(q, 64) {
        return SearchType::Transaction;
    }
    if is_hex_of_len(q, 40) {
        return SearchType::Address;
    }
    SearchType::Unknown
}
