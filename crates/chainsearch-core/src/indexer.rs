//! Indexers map decoded payloads to documents and write them in batches.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::decode::{EventLog, FunctionCallLog};
use crate::error::IndexerError;
use crate::search::{SearchBackend, SearchDocument};

/// Maps one payload to a search document.
///
/// Mappers are pure: the same payload always yields the same document.
/// Any `Fn(&T) -> SearchDocument` closure is a mapper.
pub trait DocumentMapper<T>: Send + Sync {
    fn map(&self, item: &T) -> Result<SearchDocument, IndexerError>;
}

impl<T, F> DocumentMapper<T> for F
where
    F: Fn(&T) -> SearchDocument + Send + Sync,
{
    fn map(&self, item: &T) -> Result<SearchDocument, IndexerError> {
        Ok(self(item))
    }
}

/// Receives decoded payloads of type `T` and writes them to a named index.
#[async_trait]
pub trait Indexer<T: Sync>: Send + Sync {
    fn index_name(&self) -> &str;

    async fn index(&self, item: &T) -> Result<(), IndexerError> {
        self.index_batch(std::slice::from_ref(item)).await
    }

    /// Index `items` in order. An empty slice writes nothing.
    async fn index_batch(&self, items: &[T]) -> Result<(), IndexerError>;
}

/// Type-erased view of an indexer, for listing and stats.
#[async_trait]
pub trait IndexHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn document_count(&self) -> Result<u64, IndexerError>;
}

// ─── SearchIndexer ───────────────────────────────────────────────────────────

/// Indexer bound to one index of a [`SearchBackend`].
pub struct SearchIndexer<T> {
    backend: Arc<dyn SearchBackend>,
    index_name: String,
    mapper: Arc<dyn DocumentMapper<T>>,
    batch_size: usize,
}

impl<T> SearchIndexer<T> {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        index_name: impl Into<String>,
        mapper: Arc<dyn DocumentMapper<T>>,
        batch_size: usize,
    ) -> Self {
        Self {
            backend,
            index_name: index_name.into(),
            mapper,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Indexer<T> for SearchIndexer<T> {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn index_batch(&self, items: &[T]) -> Result<(), IndexerError> {
        if items.is_empty() {
            return Ok(());
        }
        let documents = items
            .iter()
            .map(|item| self.mapper.map(item))
            .collect::<Result<Vec<_>, _>>()?;

        for batch in documents.chunks(self.batch_size) {
            self.backend.write_batch(&self.index_name, batch).await?;
            tracing::debug!(index = %self.index_name, documents = batch.len(), "Flushed index batch");
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> IndexHandle for SearchIndexer<T> {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn document_count(&self) -> Result<u64, IndexerError> {
        self.backend.count(&self.index_name).await
    }
}

// ─── Default mappers ─────────────────────────────────────────────────────────

/// Merge the serialised payload into `fields`. Objects are flattened; other
/// values land under `"value"`. Preset fields win over payload fields.
fn merge_payload<P: Serialize>(
    fields: &mut Map<String, Value>,
    payload: &P,
) -> Result<(), IndexerError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| IndexerError::Decode(format!("cannot serialise payload: {e}")))?;
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                fields.entry(k).or_insert(v);
            }
        }
        Value::Null => {}
        other => {
            fields.entry("value").or_insert(other);
        }
    }
    Ok(())
}

/// Default mapping for events: identity is `<tx hash>_<log index>`.
#[derive(Debug, Clone, Copy)]
pub struct EventLogMapper {
    preset_fields: bool,
}

impl EventLogMapper {
    pub fn new(preset_fields: bool) -> Self {
        Self { preset_fields }
    }
}

impl<E: Serialize + Send + Sync> DocumentMapper<EventLog<E>> for EventLogMapper {
    fn map(&self, item: &EventLog<E>) -> Result<SearchDocument, IndexerError> {
        let log = &item.log;
        let mut doc = SearchDocument::new(log.key());
        if self.preset_fields {
            doc = doc
                .with_field("log_key", log.key())
                .with_field("log_address", log.address.clone())
                .with_field("log_block_number", log.block_number)
                .with_field("log_transaction_hash", log.transaction_hash.clone())
                .with_field("log_transaction_index", log.transaction_index)
                .with_field("log_index", log.log_index);
        }
        merge_payload(&mut doc.fields, &item.event)?;
        Ok(doc)
    }
}

/// Default mapping for function calls: identity is the transaction hash.
#[derive(Debug, Clone, Copy)]
pub struct FunctionCallMapper {
    preset_fields: bool,
}

impl FunctionCallMapper {
    pub fn new(preset_fields: bool) -> Self {
        Self { preset_fields }
    }
}

impl<F: Serialize + Send + Sync> DocumentMapper<FunctionCallLog<F>> for FunctionCallMapper {
    fn map(&self, item: &FunctionCallLog<F>) -> Result<SearchDocument, IndexerError> {
        let tx = &item.transaction;
        let mut doc = SearchDocument::new(tx.hash.clone());
        if self.preset_fields {
            doc = doc
                .with_field("tx_hash", tx.hash.clone())
                .with_field("tx_block_number", tx.block_number)
                .with_field("tx_index", tx.transaction_index)
                .with_field("tx_from", tx.from.clone())
                .with_field("tx_to", tx.to.clone().map_or(Value::Null, Value::String))
                .with_field("tx_value", tx.value.clone());
        }
        merge_payload(&mut doc.fields, &item.call)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::IndexSchema;
    use crate::types::{LogEntry, TransactionRecord};
    use std::sync::Mutex;

    #[derive(Default)]
    struct BatchLog(Mutex<Vec<Vec<String>>>);

    #[async_trait]
    impl SearchBackend for BatchLog {
        async fn index_exists(&self, _name: &str) -> Result<bool, IndexerError> {
            Ok(true)
        }
        async fn create_index(&self, _schema: &IndexSchema) -> Result<(), IndexerError> {
            Ok(())
        }
        async fn write_batch(&self, _index: &str, docs: &[SearchDocument]) -> Result<(), IndexerError> {
            self.0.lock().unwrap().push(docs.iter().map(|d| d.id.clone()).collect());
            Ok(())
        }
        async fn count(&self, _index: &str) -> Result<u64, IndexerError> {
            Ok(self.0.lock().unwrap().iter().map(|b| b.len() as u64).sum())
        }
        async fn delete_index(&self, _name: &str) -> Result<(), IndexerError> {
            Ok(())
        }
    }

    #[derive(Debug, Serialize)]
    struct Transfer {
        from: String,
        to: String,
        value: String,
    }

    fn transfer_log(tx: &str, log_index: u32) -> EventLog<Transfer> {
        EventLog {
            event: Transfer {
                from: "0xaaa".into(),
                to: "0xbbb".into(),
                value: "1000".into(),
            },
            log: LogEntry {
                address: "0xtoken".into(),
                topics: vec!["0xddf2".into()],
                data: "0x".into(),
                block_number: 10,
                block_hash: "0xb".into(),
                transaction_hash: tx.into(),
                transaction_index: 2,
                log_index,
            },
        }
    }

    #[test]
    fn event_mapper_sets_identity_and_presets() {
        let doc = EventLogMapper::new(true).map(&transfer_log("0xt1", 4)).unwrap();
        assert_eq!(doc.id, "0xt1_4");
        assert_eq!(doc.get("log_block_number"), Some(&Value::from(10u64)));
        assert_eq!(doc.get("to"), Some(&Value::from("0xbbb")));
    }

    #[test]
    fn event_mapper_without_presets() {
        let doc = EventLogMapper::new(false).map(&transfer_log("0xt1", 4)).unwrap();
        assert!(doc.get("log_key").is_none());
        assert_eq!(doc.fields.len(), 3);
    }

    #[test]
    fn function_mapper_sets_tx_fields() {
        #[derive(Serialize)]
        struct Approve {
            spender: String,
        }
        let call = FunctionCallLog {
            call: Approve { spender: "0xs".into() },
            transaction: TransactionRecord {
                hash: "0xtx".into(),
                block_number: 5,
                transaction_index: 1,
                from: "0xf".into(),
                to: None,
                input: "0x095ea7b3".into(),
                value: "0".into(),
            },
        };
        let doc = FunctionCallMapper::new(true).map(&call).unwrap();
        assert_eq!(doc.id, "0xtx");
        assert_eq!(doc.get("tx_to"), Some(&Value::Null));
        assert_eq!(doc.get("spender"), Some(&Value::from("0xs")));
    }

    #[tokio::test]
    async fn single_item_is_one_flush() {
        let backend = Arc::new(BatchLog::default());
        let mapper = |e: &EventLog<Transfer>| {
            SearchDocument::new(e.log.transaction_hash.clone()).with_field("log_index", e.log.log_index)
        };
        let indexer: SearchIndexer<EventLog<Transfer>> =
            SearchIndexer::new(backend.clone(), "transfers", Arc::new(mapper), 100);

        indexer.index(&transfer_log("0xt1", 0)).await.unwrap();

        let batches = backend.0.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec!["0xt1".to_string()]);
    }

    #[tokio::test]
    async fn batches_preserve_order() {
        let backend = Arc::new(BatchLog::default());
        let indexer: SearchIndexer<EventLog<Transfer>> = SearchIndexer::new(
            backend.clone(),
            "transfers",
            Arc::new(EventLogMapper::new(true)),
            2,
        );
        let items: Vec<_> = (0..5).map(|i| transfer_log("0xt", i)).collect();

        indexer.index_batch(&items).await.unwrap();
        indexer.index_batch(&[]).await.unwrap();

        let batches = backend.0.lock().unwrap();
        assert_eq!(
            *batches,
            vec![
                vec!["0xt_0".to_string(), "0xt_1".to_string()],
                vec!["0xt_2".to_string(), "0xt_3".to_string()],
                vec!["0xt_4".to_string()],
            ]
        );
    }
}
