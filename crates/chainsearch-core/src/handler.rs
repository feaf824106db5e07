//! Log processors, transaction handlers and the shared function-call processor.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::decode::{EventDecode, EventLog, FunctionCallLog, FunctionDecode};
use crate::error::IndexerError;
use crate::indexer::Indexer;
use crate::source::ChainSource;
use crate::types::{LogEntry, LogFilter, TransactionRecord};

/// Consumer of the logs of one event type.
#[async_trait]
pub trait LogProcessor: Send + Sync {
    /// Name used when attributing dispatch errors.
    fn name(&self) -> &str;

    /// Returns `true` if this processor handles `log`.
    fn is_log_for_event(&self, log: &LogEntry) -> bool;

    /// Process matched logs of one range, in block/transaction/log order.
    async fn process_logs(&self, logs: &[LogEntry]) -> Result<(), IndexerError>;
}

/// Consumer of the transactions that emitted a given event type.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle_transaction(&self, tx: &TransactionRecord) -> Result<(), IndexerError>;
}

// ─── FunctionProcessor ───────────────────────────────────────────────────────

/// Routes the emitting transactions of processed events to transaction handlers.
///
/// Handlers are keyed by route, one route per event registration, so a
/// handler registered once runs once per log batch even when the same event
/// type feeds several indexes. Registration happens before a run; processing
/// only reads the handler table.
pub struct FunctionProcessor {
    source: Arc<dyn ChainSource>,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn TransactionHandler>>>>,
}

impl FunctionProcessor {
    pub fn new(source: Arc<dyn ChainSource>) -> Self {
        Self {
            source,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for transactions routed through `route`.
    pub fn add_handler(
        &self,
        route: &str,
        handler: Arc<dyn TransactionHandler>,
    ) -> Result<(), IndexerError> {
        self.handlers
            .write()
            .map_err(|e| IndexerError::Other(format!("handler table poisoned: {e}")))?
            .entry(route.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    fn handlers_for(&self, route: &str) -> Result<Vec<Arc<dyn TransactionHandler>>, IndexerError> {
        let handlers = self
            .handlers
            .read()
            .map_err(|e| IndexerError::Other(format!("handler table poisoned: {e}")))?;
        Ok(handlers.get(route).cloned().unwrap_or_default())
    }

    /// Fetch each distinct emitting transaction of `logs` once and pass it to
    /// every handler registered for `route`.
    pub async fn process(&self, route: &str, logs: &[LogEntry]) -> Result<(), IndexerError> {
        let handlers = self.handlers_for(route)?;
        if handlers.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::new();
        for log in logs {
            if !seen.insert(log.transaction_hash.as_str()) {
                continue;
            }
            let tx = self
                .source
                .get_transaction(&log.transaction_hash)
                .await?
                .ok_or_else(|| {
                    IndexerError::Fetch(format!(
                        "transaction {} not found for log at block {}",
                        log.transaction_hash, log.block_number
                    ))
                })?;
            for handler in &handlers {
                handler
                    .handle_transaction(&tx)
                    .await
                    .map_err(|e| IndexerError::dispatch(handler.name(), e))?;
            }
        }
        Ok(())
    }
}

// ─── EventIndexProcessor ─────────────────────────────────────────────────────

/// Decodes logs of event `E`, indexes them, then runs the function handlers
/// registered on its route.
///
/// The route is the index name, which is unique among event registrations.
pub struct EventIndexProcessor<E: EventDecode> {
    indexer: Arc<dyn Indexer<EventLog<E>>>,
    functions: Arc<FunctionProcessor>,
}

impl<E: EventDecode> EventIndexProcessor<E> {
    pub fn new(indexer: Arc<dyn Indexer<EventLog<E>>>, functions: Arc<FunctionProcessor>) -> Self {
        Self { indexer, functions }
    }

    pub fn index_name(&self) -> &str {
        self.indexer.index_name()
    }

    /// Handler route of this processor.
    pub fn route(&self) -> &str {
        self.indexer.index_name()
    }
}

#[async_trait]
impl<E: EventDecode> LogProcessor for EventIndexProcessor<E> {
    fn name(&self) -> &str {
        E::NAME
    }

    fn is_log_for_event(&self, log: &LogEntry) -> bool {
        E::is_log_for_event(log)
    }

    async fn process_logs(&self, logs: &[LogEntry]) -> Result<(), IndexerError> {
        let events = logs
            .iter()
            .map(EventLog::<E>::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IndexerError::dispatch(E::NAME, e))?;

        self.indexer
            .index_batch(&events)
            .await
            .map_err(|e| IndexerError::dispatch(E::NAME, e))?;

        self.functions.process(self.route(), logs).await
    }
}

// ─── FunctionIndexHandler ────────────────────────────────────────────────────

/// Indexes transactions whose calldata invokes function `F`.
pub struct FunctionIndexHandler<F: FunctionDecode> {
    indexer: Arc<dyn Indexer<FunctionCallLog<F>>>,
    _call: PhantomData<fn() -> F>,
}

impl<F: FunctionDecode> FunctionIndexHandler<F> {
    pub fn new(indexer: Arc<dyn Indexer<FunctionCallLog<F>>>) -> Self {
        Self {
            indexer,
            _call: PhantomData,
        }
    }

    pub fn index_name(&self) -> &str {
        self.indexer.index_name()
    }
}

#[async_trait]
impl<F: FunctionDecode> TransactionHandler for FunctionIndexHandler<F> {
    fn name(&self) -> &str {
        F::NAME
    }

    async fn handle_transaction(&self, tx: &TransactionRecord) -> Result<(), IndexerError> {
        if !tx.calls(F::SELECTOR) {
            return Ok(());
        }
        let call = FunctionCallLog::<F>::decode(tx)?;
        self.indexer.index(&call).await
    }
}

// ─── FilterLogIndexProcessor ─────────────────────────────────────────────────

/// Indexes raw logs matching a [`LogFilter`], with no typed decoding.
pub struct FilterLogIndexProcessor {
    indexer: Arc<dyn Indexer<LogEntry>>,
    filter: LogFilter,
}

impl FilterLogIndexProcessor {
    pub fn new(indexer: Arc<dyn Indexer<LogEntry>>, filter: LogFilter) -> Self {
        Self { indexer, filter }
    }
}

#[async_trait]
impl LogProcessor for FilterLogIndexProcessor {
    fn name(&self) -> &str {
        self.indexer.index_name()
    }

    fn is_log_for_event(&self, log: &LogEntry) -> bool {
        self.filter.matches(log)
    }

    async fn process_logs(&self, logs: &[LogEntry]) -> Result<(), IndexerError> {
        self.indexer
            .index_batch(logs)
            .await
            .map_err(|e| IndexerError::dispatch(self.indexer.index_name(), e))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockRange;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct TxSource {
        txs: HashMap<String, TransactionRecord>,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl ChainSource for TxSource {
        async fn chain_height(&self) -> Result<u64, IndexerError> {
            Ok(0)
        }
        async fn get_logs(&self, _r: BlockRange, _f: &[LogFilter]) -> Result<Vec<LogEntry>, IndexerError> {
            Ok(vec![])
        }
        async fn get_transaction(&self, hash: &str) -> Result<Option<TransactionRecord>, IndexerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.txs.get(hash).cloned())
        }
    }

    fn tx(hash: &str, input: &str) -> TransactionRecord {
        TransactionRecord {
            hash: hash.into(),
            block_number: 1,
            transaction_index: 0,
            from: "0xfrom".into(),
            to: Some("0xtoken".into()),
            input: input.into(),
            value: "0".into(),
        }
    }

    fn log(tx_hash: &str, log_index: u32) -> LogEntry {
        LogEntry {
            address: "0xtoken".into(),
            topics: vec!["0xddf2".into()],
            data: "0x".into(),
            block_number: 1,
            block_hash: "0xb".into(),
            transaction_hash: tx_hash.into(),
            transaction_index: 0,
            log_index,
        }
    }

    #[derive(Debug, PartialEq)]
    struct Transfer {
        log_index: u32,
    }

    impl EventDecode for Transfer {
        const NAME: &'static str = "Transfer";
        const SIGNATURE: &'static str = "0xDDF2";
        fn decode(log: &LogEntry) -> Result<Self, IndexerError> {
            if log.data == "0xbad" {
                return Err(IndexerError::Decode("truncated data".into()));
            }
            Ok(Self { log_index: log.log_index })
        }
    }

    struct TransferCall;

    impl FunctionDecode for TransferCall {
        const NAME: &'static str = "transfer";
        const SELECTOR: &'static str = "0xa9059cbb";
        fn decode(_tx: &TransactionRecord) -> Result<Self, IndexerError> {
            Ok(Self)
        }
    }

    struct Collect<T> {
        items: Mutex<Vec<String>>,
        _t: PhantomData<fn() -> T>,
    }

    impl<T> Default for Collect<T> {
        fn default() -> Self {
            Self {
                items: Mutex::new(Vec::new()),
                _t: PhantomData,
            }
        }
    }

    #[async_trait]
    impl Indexer<EventLog<Transfer>> for Collect<Transfer> {
        fn index_name(&self) -> &str {
            "transfer"
        }
        async fn index_batch(&self, items: &[EventLog<Transfer>]) -> Result<(), IndexerError> {
            self.items
                .lock()
                .unwrap()
                .extend(items.iter().map(|e| e.log.key()));
            Ok(())
        }
    }

    #[async_trait]
    impl Indexer<FunctionCallLog<TransferCall>> for Collect<TransferCall> {
        fn index_name(&self) -> &str {
            "transfer_calls"
        }
        async fn index_batch(&self, items: &[FunctionCallLog<TransferCall>]) -> Result<(), IndexerError> {
            self.items
                .lock()
                .unwrap()
                .extend(items.iter().map(|c| c.transaction.hash.clone()));
            Ok(())
        }
    }

    #[async_trait]
    impl Indexer<LogEntry> for Collect<LogEntry> {
        fn index_name(&self) -> &str {
            "token_logs"
        }
        async fn index_batch(&self, items: &[LogEntry]) -> Result<(), IndexerError> {
            self.items.lock().unwrap().extend(items.iter().map(LogEntry::key));
            Ok(())
        }
    }

    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl TransactionHandler for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        async fn handle_transaction(&self, _tx: &TransactionRecord) -> Result<(), IndexerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source(txs: Vec<TransactionRecord>) -> Arc<TxSource> {
        Arc::new(TxSource {
            txs: txs.into_iter().map(|t| (t.hash.clone(), t)).collect(),
            fetches: AtomicU32::new(0),
        })
    }

    #[test]
    fn matches_topic_case_insensitively() {
        let functions = Arc::new(FunctionProcessor::new(source(vec![])));
        let processor =
            EventIndexProcessor::<Transfer>::new(Arc::new(Collect::<Transfer>::default()), functions);
        assert!(processor.is_log_for_event(&log("0xt", 0)));

        let mut other = log("0xt", 0);
        other.topics = vec!["0x8c5b".into()];
        assert!(!processor.is_log_for_event(&other));
    }

    #[tokio::test]
    async fn event_processor_indexes_in_order() {
        let indexer = Arc::new(Collect::<Transfer>::default());
        let functions = Arc::new(FunctionProcessor::new(source(vec![])));
        let processor = EventIndexProcessor::<Transfer>::new(indexer.clone(), functions);

        processor
            .process_logs(&[log("0xt1", 0), log("0xt1", 1), log("0xt2", 0)])
            .await
            .unwrap();

        assert_eq!(*indexer.items.lock().unwrap(), vec!["0xt1_0", "0xt1_1", "0xt2_0"]);
    }

    #[tokio::test]
    async fn decode_failure_is_dispatch_error() {
        let functions = Arc::new(FunctionProcessor::new(source(vec![])));
        let processor =
            EventIndexProcessor::<Transfer>::new(Arc::new(Collect::<Transfer>::default()), functions);

        let mut bad = log("0xt1", 0);
        bad.data = "0xbad".into();
        let err = processor.process_logs(&[bad]).await.unwrap_err();
        assert!(matches!(err, IndexerError::Dispatch { ref handler, .. } if handler == "Transfer"));
    }

    #[tokio::test]
    async fn function_handlers_see_each_transaction_once() {
        let src = source(vec![tx("0xt1", "0xa9059cbb00"), tx("0xt2", "0x23b872dd00")]);
        let functions = Arc::new(FunctionProcessor::new(src.clone()));
        let count = Arc::new(AtomicU32::new(0));
        functions.add_handler("transfer", Arc::new(Counter(count.clone()))).unwrap();

        functions
            .process("transfer", &[log("0xt1", 0), log("0xt1", 1), log("0xt2", 0)])
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(src.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_handlers_means_no_fetches() {
        let src = source(vec![]);
        let functions = FunctionProcessor::new(src.clone());
        functions.process("transfer", &[log("0xt1", 0)]).await.unwrap();
        assert_eq!(src.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_transaction_is_fetch_error() {
        let functions = FunctionProcessor::new(source(vec![]));
        functions
            .add_handler("transfer", Arc::new(Counter(Arc::new(AtomicU32::new(0)))))
            .unwrap();
        let err = functions.process("transfer", &[log("0xgone", 0)]).await.unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn function_index_handler_filters_by_selector() {
        let indexer = Arc::new(Collect::<TransferCall>::default());
        let handler = FunctionIndexHandler::<TransferCall>::new(indexer.clone());

        handler.handle_transaction(&tx("0xt1", "0xa9059cbb00")).await.unwrap();
        handler.handle_transaction(&tx("0xt2", "0x095ea7b300")).await.unwrap();

        assert_eq!(*indexer.items.lock().unwrap(), vec!["0xt1"]);
    }

    #[tokio::test]
    async fn filter_log_processor_indexes_matching_raw_logs() {
        let indexer = Arc::new(Collect::<LogEntry>::default());
        let processor =
            FilterLogIndexProcessor::new(indexer.clone(), LogFilter::address("0xTOKEN").topic0("0xDDF2"));

        let mut elsewhere = log("0xt2", 0);
        elsewhere.address = "0xother".into();
        assert_eq!(processor.name(), "token_logs");
        assert!(processor.is_log_for_event(&log("0xt1", 0)));
        assert!(!processor.is_log_for_event(&elsewhere));

        processor.process_logs(&[log("0xt1", 0), log("0xt1", 4)]).await.unwrap();
        assert_eq!(*indexer.items.lock().unwrap(), vec!["0xt1_0", "0xt1_4"]);
    }
}
