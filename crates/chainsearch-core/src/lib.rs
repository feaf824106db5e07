//! chainsearch-core — batch block-range processing and search indexing engine.
//!
//! # Architecture
//!
//! ```text
//! EventIndexingProcessor (orchestrator)
//!     └── BatchProcessor
//!            ├── BlockProgressService  (next range / advance checkpoint)
//!            │       └── ProgressStore (durable checkpoint)
//!            └── BlockchainLogProcessor (fetch logs → dispatch)
//!                    └── LogProcessor (EventIndexProcessor, custom)
//!                            ├── Indexer → SearchService → SearchBackend
//!                            └── FunctionProcessor → TransactionHandler
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod decode;
pub mod error;
pub mod handler;
pub mod indexer;
pub mod log_processor;
pub mod orchestrator;
pub mod progress;
pub mod query;
pub mod reorg;
pub mod search;
pub mod source;
pub mod types;

pub use batch::{BatchProcessor, BatchState, RangeCallback};
pub use checkpoint::{Checkpoint, MemoryProgressStore, ProgressStore};
pub use config::ProcessorConfig;
pub use decode::{EventDecode, EventLog, FunctionCallLog, FunctionDecode};
pub use error::IndexerError;
pub use handler::{
    EventIndexProcessor, FilterLogIndexProcessor, FunctionIndexHandler, FunctionProcessor,
    LogProcessor, TransactionHandler,
};
pub use indexer::{DocumentMapper, IndexHandle, Indexer, SearchIndexer};
pub use log_processor::{BlockchainLogProcessor, RangeStats};
pub use orchestrator::{EventIndexingProcessor, ProgressFactory};
pub use progress::{
    BlockProgressService, LiveBlockProgressService, StaticBlockProgressService,
};
pub use query::{infer_search_type, SearchType};
pub use search::{FieldKind, IndexField, IndexSchema, SearchBackend, SearchDocument, SearchService};
pub use source::ChainSource;
pub use types::{BlockRange, LogEntry, LogFilter, TransactionRecord};
