//! Search index schemas, documents, the backend trait and the search service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decode::{EventDecode, EventLog, FunctionCallLog, FunctionDecode};
use crate::error::IndexerError;
use crate::indexer::{DocumentMapper, EventLogMapper, FunctionCallMapper, SearchIndexer};

/// Default number of documents flushed per backend write.
pub const DEFAULT_DOCUMENT_BATCH_SIZE: usize = 1000;

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Data type of an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Decimal,
    Json,
}

/// One field of a search index schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub kind: FieldKind,
    /// The document identity field (exactly one per schema).
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub is_filterable: bool,
}

impl IndexField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_key: false,
            is_filterable: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.is_filterable = true;
        self
    }
}

/// Preset metadata fields describing the log an event came from.
pub fn preset_log_fields() -> Vec<IndexField> {
    vec![
        IndexField::new("log_key", FieldKind::String).key(),
        IndexField::new("log_address", FieldKind::String).filterable(),
        IndexField::new("log_block_number", FieldKind::Integer).filterable(),
        IndexField::new("log_transaction_hash", FieldKind::String).filterable(),
        IndexField::new("log_transaction_index", FieldKind::Integer),
        IndexField::new("log_index", FieldKind::Integer),
    ]
}

/// Preset metadata fields describing the transaction a function call came from.
pub fn preset_transaction_fields() -> Vec<IndexField> {
    vec![
        IndexField::new("tx_hash", FieldKind::String).key(),
        IndexField::new("tx_block_number", FieldKind::Integer).filterable(),
        IndexField::new("tx_index", FieldKind::Integer),
        IndexField::new("tx_from", FieldKind::String).filterable(),
        IndexField::new("tx_to", FieldKind::String).filterable(),
        IndexField::new("tx_value", FieldKind::Decimal),
    ]
}

/// Schema of a named search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<IndexField>,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = IndexField>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Schema for event `E`, named `index_name` or the lowercased event name.
    pub fn for_event<E: EventDecode>(index_name: Option<&str>, preset_fields: bool) -> Self {
        let name = index_name.map_or_else(|| E::NAME.to_lowercase(), str::to_string);
        let schema = Self::new(name);
        let schema = if preset_fields {
            schema.with_fields(preset_log_fields())
        } else {
            schema
        };
        schema.with_fields(E::index_fields())
    }

    /// Schema for function `F`, named `index_name` or the lowercased function name.
    pub fn for_function<F: FunctionDecode>(index_name: Option<&str>, preset_fields: bool) -> Self {
        let name = index_name.map_or_else(|| F::NAME.to_lowercase(), str::to_string);
        let schema = Self::new(name);
        let schema = if preset_fields {
            schema.with_fields(preset_transaction_fields())
        } else {
            schema
        };
        schema.with_fields(F::index_fields())
    }

    pub fn key_field(&self) -> Option<&IndexField> {
        self.fields.iter().find(|f| f.is_key)
    }
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// A mapped output document, upserted by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl SearchDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// A searchable document store.
///
/// Implementations: `MemorySearchBackend`, `SqliteStorage` (feature `sqlite`).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexerError>;

    /// Create an index. Called only after `index_exists` returned `false`.
    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexerError>;

    /// Upsert `documents` into `index` as one unit, in order.
    async fn write_batch(
        &self,
        index: &str,
        documents: &[SearchDocument],
    ) -> Result<(), IndexerError>;

    async fn count(&self, index: &str) -> Result<u64, IndexerError>;

    async fn delete_index(&self, name: &str) -> Result<(), IndexerError>;
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Creates indexers over one backend and remembers which indexes exist.
///
/// The registry of known indexes is owned by this instance and safe for
/// concurrent lookup and insert.
pub struct SearchService {
    backend: Arc<dyn SearchBackend>,
    known: RwLock<HashMap<String, IndexSchema>>,
    batch_size: usize,
}

impl SearchService {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            known: RwLock::new(HashMap::new()),
            batch_size: DEFAULT_DOCUMENT_BATCH_SIZE,
        }
    }

    /// Maximum number of documents per backend write.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn backend(&self) -> Arc<dyn SearchBackend> {
        self.backend.clone()
    }

    fn is_known(&self, name: &str) -> Result<bool, IndexerError> {
        let known = self
            .known
            .read()
            .map_err(|e| IndexerError::Storage(format!("index registry poisoned: {e}")))?;
        Ok(known.contains_key(name))
    }

    fn forget(&self, name: &str) -> Result<(), IndexerError> {
        self.known
            .write()
            .map_err(|e| IndexerError::Storage(format!("index registry poisoned: {e}")))?
            .remove(name);
        Ok(())
    }

    /// Names of indexes this service has ensured.
    pub fn known_indexes(&self) -> Vec<String> {
        self.known
            .read()
            .map(|k| k.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Create the index if it does not exist yet.
    pub async fn ensure_index(&self, schema: &IndexSchema) -> Result<(), IndexerError> {
        if self.is_known(&schema.name)? {
            return Ok(());
        }
        if !self.backend.index_exists(&schema.name).await? {
            self.backend.create_index(schema).await?;
            tracing::info!(index = %schema.name, fields = schema.fields.len(), "Created search index");
        }
        self.known
            .write()
            .map_err(|e| IndexerError::Storage(format!("index registry poisoned: {e}")))?
            .insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    /// Ensure `schema` exists and return an indexer writing through `mapper`.
    pub async fn create_indexer<T, M>(
        &self,
        schema: IndexSchema,
        mapper: M,
    ) -> Result<SearchIndexer<T>, IndexerError>
    where
        T: Send + Sync + 'static,
        M: DocumentMapper<T> + 'static,
    {
        self.ensure_index(&schema).await?;
        Ok(SearchIndexer::new(
            self.backend.clone(),
            schema.name,
            Arc::new(mapper),
            self.batch_size,
        ))
    }

    /// Indexer for event `E` using the default mapping with preset log fields.
    pub async fn create_event_indexer<E>(
        &self,
        index_name: Option<&str>,
    ) -> Result<SearchIndexer<EventLog<E>>, IndexerError>
    where
        E: EventDecode + Serialize,
    {
        self.create_event_indexer_with_presets::<E>(index_name, true).await
    }

    /// Indexer for event `E` using the default mapping. Without preset fields
    /// only the key and the event's own fields are indexed.
    pub async fn create_event_indexer_with_presets<E>(
        &self,
        index_name: Option<&str>,
        preset_fields: bool,
    ) -> Result<SearchIndexer<EventLog<E>>, IndexerError>
    where
        E: EventDecode + Serialize,
    {
        let schema = IndexSchema::for_event::<E>(index_name, preset_fields);
        self.create_indexer(schema, EventLogMapper::new(preset_fields)).await
    }

    /// Indexer for function `F` using the default mapping with preset transaction fields.
    pub async fn create_function_indexer<F>(
        &self,
        index_name: Option<&str>,
    ) -> Result<SearchIndexer<FunctionCallLog<F>>, IndexerError>
    where
        F: FunctionDecode + Serialize,
    {
        self.create_function_indexer_with_presets::<F>(index_name, true).await
    }

    pub async fn create_function_indexer_with_presets<F>(
        &self,
        index_name: Option<&str>,
        preset_fields: bool,
    ) -> Result<SearchIndexer<FunctionCallLog<F>>, IndexerError>
    where
        F: FunctionDecode + Serialize,
    {
        let schema = IndexSchema::for_function::<F>(index_name, preset_fields);
        self.create_indexer(schema, FunctionCallMapper::new(preset_fields)).await
    }

    /// Delete an index if it exists.
    pub async fn delete_index(&self, name: &str) -> Result<(), IndexerError> {
        if self.backend.index_exists(name).await? {
            self.backend.delete_index(name).await?;
            tracing::info!(index = %name, "Deleted search index");
        }
        self.forget(name)
    }

    pub async fn count_documents(&self, name: &str) -> Result<u64, IndexerError> {
        self.backend.count(name).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::types::LogEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        indexes: Mutex<HashMap<String, Vec<SearchDocument>>>,
        creates: AtomicUsize,
        exists_calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchBackend for RecordingBackend {
        async fn index_exists(&self, name: &str) -> Result<bool, IndexerError> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.indexes.lock().unwrap().contains_key(name))
        }
        async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexerError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.indexes.lock().unwrap().insert(schema.name.clone(), vec![]);
            Ok(())
        }
        async fn write_batch(&self, index: &str, docs: &[SearchDocument]) -> Result<(), IndexerError> {
            self.indexes
                .lock()
                .unwrap()
                .get_mut(index)
                .ok_or_else(|| IndexerError::Storage(format!("no index {index}")))?
                .extend_from_slice(docs);
            Ok(())
        }
        async fn count(&self, index: &str) -> Result<u64, IndexerError> {
            Ok(self.indexes.lock().unwrap().get(index).map_or(0, |d| d.len() as u64))
        }
        async fn delete_index(&self, name: &str) -> Result<(), IndexerError> {
            self.indexes.lock().unwrap().remove(name);
            Ok(())
        }
    }

    #[derive(Debug, Serialize)]
    struct Approval {
        owner: String,
    }

    impl EventDecode for Approval {
        const NAME: &'static str = "Approval";
        const SIGNATURE: &'static str = "0x8c5b";
        fn decode(log: &LogEntry) -> Result<Self, IndexerError> {
            Ok(Self { owner: log.address.clone() })
        }
        fn index_fields() -> Vec<IndexField> {
            vec![IndexField::new("owner", FieldKind::String).filterable()]
        }
    }

    #[test]
    fn event_schema_has_preset_and_event_fields() {
        let schema = IndexSchema::for_event::<Approval>(None, true);
        assert_eq!(schema.name, "approval");
        assert_eq!(schema.key_field().unwrap().name, "log_key");
        assert!(schema.fields.iter().any(|f| f.name == "owner"));

        let bare = IndexSchema::for_event::<Approval>(Some("approvals-v2"), false);
        assert_eq!(bare.name, "approvals-v2");
        assert_eq!(bare.fields.len(), 1);
    }

    #[tokio::test]
    async fn ensure_index_creates_once() {
        let backend = Arc::new(RecordingBackend::default());
        let service = SearchService::new(backend.clone());
        let schema = IndexSchema::new("transfers");

        service.ensure_index(&schema).await.unwrap();
        service.ensure_index(&schema).await.unwrap();

        assert_eq!(backend.creates.load(Ordering::SeqCst), 1);
        // Second call served from the registry
        assert_eq!(backend.exists_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.known_indexes(), vec!["transfers".to_string()]);
    }

    #[tokio::test]
    async fn existing_index_is_not_recreated() {
        let backend = Arc::new(RecordingBackend::default());
        backend.indexes.lock().unwrap().insert("transfers".into(), vec![]);
        let service = SearchService::new(backend.clone());

        service.ensure_index(&IndexSchema::new("transfers")).await.unwrap();
        assert_eq!(backend.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_missing_index_is_noop() {
        let backend = Arc::new(RecordingBackend::default());
        let service = SearchService::new(backend);
        service.delete_index("nothing-here").await.unwrap();
    }

    #[tokio::test]
    async fn event_indexer_writes_and_counts() {
        let backend = Arc::new(RecordingBackend::default());
        let service = SearchService::new(backend.clone());
        let indexer = service.create_event_indexer::<Approval>(None).await.unwrap();

        let log = LogEntry {
            address: "0xowner".into(),
            topics: vec!["0x8c5b".into()],
            data: "0x".into(),
            block_number: 7,
            block_hash: "0xb".into(),
            transaction_hash: "0xt".into(),
            transaction_index: 0,
            log_index: 1,
        };
        indexer.index(&EventLog::<Approval>::decode(&log).unwrap()).await.unwrap();

        assert_eq!(service.count_documents("approval").await.unwrap(), 1);
        service.delete_index("approval").await.unwrap();
        assert!(service.known_indexes().is_empty());
    }
}
