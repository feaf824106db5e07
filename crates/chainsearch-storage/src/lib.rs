//! chainsearch-storage — pluggable storage backends for ChainSearch.
//!
//! Backends:
//! - [`memory`]: in-memory search index (dev/testing, no persistence)
//! - [`json_file`]: JSON-file progress store (default checkpoint persistence)
//! - [`sqlite`]: SQLite via `sqlx`: progress store and search index

pub mod json_file;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use json_file::JsonFileProgressStore;
pub use memory::MemorySearchBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
