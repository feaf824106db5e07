//! `EventIndexingProcessor`, the caller-facing indexing surface.
//!
//! Register event and function types, then call [`process`] for a fixed block
//! range or for the live chain tip:
//!
//! ```rust,ignore
//! let mut processor = EventIndexingProcessor::new(config, source, search, store)?;
//! let transfer_calls = processor.create_function_handler::<TransferCall>(None).await?;
//! processor.add_event::<Transfer>(None, vec![transfer_calls]).await?;
//! let blocks = processor.process(10_000, Some(10_500), None, None).await?;
//! ```
//!
//! [`process`]: EventIndexingProcessor::process

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchProcessor, RangeCallback};
use crate::checkpoint::{Checkpoint, ProgressStore};
use crate::config::ProcessorConfig;
use crate::decode::{EventDecode, EventLog, FunctionCallLog, FunctionDecode};
use crate::error::IndexerError;
use crate::handler::{
    EventIndexProcessor, FilterLogIndexProcessor, FunctionIndexHandler, FunctionProcessor,
    LogProcessor, TransactionHandler,
};
use crate::indexer::{DocumentMapper, IndexHandle, Indexer};
use crate::log_processor::BlockchainLogProcessor;
use crate::progress::{BlockProgressService, LiveBlockProgressService, StaticBlockProgressService};
use crate::search::{IndexSchema, SearchService};
use crate::source::ChainSource;
use crate::types::{LogEntry, LogFilter};

/// Builds the progress policy for a run from `(from, to)`.
pub type ProgressFactory =
    Box<dyn Fn(u64, Option<u64>) -> Box<dyn BlockProgressService> + Send + Sync>;

/// Composes the batch processor, registered event processors and indexers,
/// and the shared function-call processor.
pub struct EventIndexingProcessor {
    config: ProcessorConfig,
    source: Arc<dyn ChainSource>,
    search: Arc<SearchService>,
    store: Arc<dyn ProgressStore>,
    functions: Arc<FunctionProcessor>,
    processors: Vec<Arc<dyn LogProcessor>>,
    /// `(event name, handler route)` per event registration.
    event_routes: Vec<(&'static str, String)>,
    indexes: Vec<Arc<dyn IndexHandle>>,
    progress_factory: Option<ProgressFactory>,
    started: bool,
}

impl EventIndexingProcessor {
    pub fn new(
        config: ProcessorConfig,
        source: Arc<dyn ChainSource>,
        search: Arc<SearchService>,
        store: Arc<dyn ProgressStore>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        Ok(Self {
            functions: Arc::new(FunctionProcessor::new(source.clone())),
            config,
            source,
            search,
            store,
            processors: Vec::new(),
            event_routes: Vec::new(),
            indexes: Vec::new(),
            progress_factory: None,
            started: false,
        })
    }

    /// Replace the default live/static progress policies.
    pub fn with_progress_factory(mut self, factory: ProgressFactory) -> Self {
        self.progress_factory = Some(factory);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn search(&self) -> &Arc<SearchService> {
        &self.search
    }

    /// Indexers created through this processor, in registration order.
    pub fn indexes(&self) -> &[Arc<dyn IndexHandle>] {
        &self.indexes
    }

    fn ensure_open(&self) -> Result<(), IndexerError> {
        if self.started {
            return Err(IndexerError::Configuration(
                "handlers cannot be registered after processing has started".into(),
            ));
        }
        Ok(())
    }

    // ─── Registration ──────────────────────────────────────────────────────

    /// Index event `E` with the default mapping and run `handlers` on each
    /// emitting transaction.
    pub async fn add_event<E>(
        &mut self,
        index_name: Option<&str>,
        handlers: Vec<Arc<dyn TransactionHandler>>,
    ) -> Result<(), IndexerError>
    where
        E: EventDecode + Serialize,
    {
        self.add_event_with_presets::<E>(index_name, true, handlers).await
    }

    /// Like [`add_event`](Self::add_event), choosing whether the preset log
    /// fields (address, block, transaction, log index) are indexed.
    pub async fn add_event_with_presets<E>(
        &mut self,
        index_name: Option<&str>,
        preset_fields: bool,
        handlers: Vec<Arc<dyn TransactionHandler>>,
    ) -> Result<(), IndexerError>
    where
        E: EventDecode + Serialize,
    {
        self.ensure_open()?;
        let indexer = Arc::new(
            self.search
                .create_event_indexer_with_presets::<E>(index_name, preset_fields)
                .await?,
        );
        self.register_event::<E>(indexer.clone(), indexer, handlers)
    }

    /// Index event `E` into `schema` through a caller-supplied mapper.
    pub async fn add_event_with_mapper<E, M>(
        &mut self,
        schema: IndexSchema,
        mapper: M,
        handlers: Vec<Arc<dyn TransactionHandler>>,
    ) -> Result<(), IndexerError>
    where
        E: EventDecode,
        M: DocumentMapper<EventLog<E>> + 'static,
    {
        self.ensure_open()?;
        let indexer = Arc::new(
            self.search
                .create_indexer::<EventLog<E>, M>(schema, mapper)
                .await?,
        );
        self.register_event::<E>(indexer.clone(), indexer, handlers)
    }

    fn register_event<E: EventDecode>(
        &mut self,
        indexer: Arc<dyn Indexer<EventLog<E>>>,
        handle: Arc<dyn IndexHandle>,
        handlers: Vec<Arc<dyn TransactionHandler>>,
    ) -> Result<(), IndexerError> {
        let processor = EventIndexProcessor::<E>::new(indexer, self.functions.clone());
        let route = processor.route().to_string();
        if self.event_routes.iter().any(|(_, r)| *r == route) {
            return Err(IndexerError::Configuration(format!(
                "index {route} is already registered for an event"
            )));
        }
        for handler in handlers {
            self.functions.add_handler(&route, handler)?;
        }
        tracing::info!(event = E::NAME, index = %route, "Registered event type");
        self.event_routes.push((E::NAME, route));
        self.processors.push(Arc::new(processor));
        self.indexes.push(handle);
        Ok(())
    }

    /// Index raw logs matching `filter` into `schema` through `mapper`.
    pub async fn add_filter_log_indexer<M>(
        &mut self,
        schema: IndexSchema,
        mapper: M,
        filter: LogFilter,
    ) -> Result<(), IndexerError>
    where
        M: DocumentMapper<LogEntry> + 'static,
    {
        self.ensure_open()?;
        let indexer = Arc::new(
            self.search
                .create_indexer::<LogEntry, M>(schema, mapper)
                .await?,
        );
        let processor = FilterLogIndexProcessor::new(indexer.clone(), filter);
        tracing::info!(index = %processor.name(), "Registered filter log indexer");
        self.processors.push(Arc::new(processor));
        self.indexes.push(indexer);
        Ok(())
    }

    /// Register a custom log processor.
    pub fn add_log_processor(&mut self, processor: Arc<dyn LogProcessor>) -> Result<(), IndexerError> {
        self.ensure_open()?;
        tracing::info!(processor = %processor.name(), "Registered log processor");
        self.processors.push(processor);
        Ok(())
    }

    /// Create an indexer for function `F` and return it as a transaction
    /// handler, ready to pass to [`add_event`](Self::add_event).
    pub async fn create_function_handler<F>(
        &mut self,
        index_name: Option<&str>,
    ) -> Result<Arc<dyn TransactionHandler>, IndexerError>
    where
        F: FunctionDecode + Serialize,
    {
        self.create_function_handler_with_presets::<F>(index_name, true).await
    }

    pub async fn create_function_handler_with_presets<F>(
        &mut self,
        index_name: Option<&str>,
        preset_fields: bool,
    ) -> Result<Arc<dyn TransactionHandler>, IndexerError>
    where
        F: FunctionDecode + Serialize,
    {
        self.ensure_open()?;
        let indexer = Arc::new(
            self.search
                .create_function_indexer_with_presets::<F>(index_name, preset_fields)
                .await?,
        );
        self.indexes.push(indexer.clone());
        Ok(Arc::new(FunctionIndexHandler::<F>::new(indexer)))
    }

    /// Function handler indexing calls to `F` into `schema` through `mapper`.
    pub async fn create_function_handler_with_mapper<F, M>(
        &mut self,
        schema: IndexSchema,
        mapper: M,
    ) -> Result<Arc<dyn TransactionHandler>, IndexerError>
    where
        F: FunctionDecode,
        M: DocumentMapper<FunctionCallLog<F>> + 'static,
    {
        self.ensure_open()?;
        let indexer = Arc::new(
            self.search
                .create_indexer::<FunctionCallLog<F>, M>(schema, mapper)
                .await?,
        );
        self.indexes.push(indexer.clone());
        Ok(Arc::new(FunctionIndexHandler::<F>::new(indexer)))
    }

    /// Index calls to `F` made by transactions that emit event `E`.
    ///
    /// `E` must already be registered; the handler is attached to its first
    /// registration.
    pub async fn add_function<E, F>(&mut self, index_name: Option<&str>) -> Result<(), IndexerError>
    where
        E: EventDecode,
        F: FunctionDecode + Serialize,
    {
        self.ensure_open()?;
        let route = self
            .event_routes
            .iter()
            .find(|(event, _)| *event == E::NAME)
            .map(|(_, route)| route.clone())
            .ok_or_else(|| {
                IndexerError::Configuration(format!(
                    "event {} must be registered before functions are attached to it",
                    E::NAME
                ))
            })?;
        let handler = self.create_function_handler::<F>(index_name).await?;
        self.functions.add_handler(&route, handler)
    }

    // ─── Processing ────────────────────────────────────────────────────────

    fn progress_service(&self, from: u64, to: Option<u64>) -> Box<dyn BlockProgressService> {
        if let Some(factory) = &self.progress_factory {
            return factory(from, to);
        }
        let store = self.store.clone();
        let stream = self.config.stream_id.clone();
        let max = self.config.max_blocks_per_batch;
        match to {
            Some(to) => Box::new(StaticBlockProgressService::new(store, stream, from, to, max)),
            None => Box::new(LiveBlockProgressService::new(
                self.source.clone(),
                store,
                stream,
                from,
                self.config.minimum_confirmations,
                max,
            )),
        }
    }

    /// Process blocks from `from` (or the stored checkpoint, if later).
    ///
    /// With `to` set, processes up to `to` and returns. Without it, follows
    /// the confirmed chain tip until `cancel` fires. Returns the number of
    /// blocks processed.
    pub async fn process(
        &mut self,
        from: u64,
        to: Option<u64>,
        cancel: Option<CancellationToken>,
        on_range: Option<RangeCallback>,
    ) -> Result<u64, IndexerError> {
        if self.processors.is_empty() {
            return Err(IndexerError::Configuration(
                "no event types or log processors registered".into(),
            ));
        }
        if let Some(to) = to {
            if to < from {
                return Err(IndexerError::Configuration(format!(
                    "invalid block range: from {from} is after to {to}"
                )));
            }
        }
        self.started = true;

        let log_processor = BlockchainLogProcessor::new(
            self.source.clone(),
            self.processors.clone(),
            self.config.filters.clone(),
        );
        let mut batch = BatchProcessor::new(
            log_processor,
            self.progress_service(from, to),
            self.config.poll_interval(),
        );
        let cancel = cancel.unwrap_or_default();

        tracing::info!(
            stream = %self.config.stream_id,
            from,
            to = ?to,
            processors = self.processors.len(),
            "Starting event indexing"
        );
        match to {
            Some(_) => batch.process_range(&cancel, on_range).await,
            None => batch.process_continually(&cancel, on_range).await,
        }
    }

    /// Stored checkpoint of this processor's progress stream.
    pub async fn progress(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load(&self.config.stream_id).await
    }

    /// Forget stored progress so the next run starts from its `from` block.
    pub async fn clear_progress(&self) -> Result<(), IndexerError> {
        self.store.delete(&self.config.stream_id).await?;
        tracing::info!(stream = %self.config.stream_id, "Cleared progress");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
