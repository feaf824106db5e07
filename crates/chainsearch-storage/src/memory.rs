//! In-memory search backend.
//!
//! Stores index schemas and documents in RAM. Useful for testing and
//! short-lived indexers that don't need persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chainsearch_core::error::IndexerError;
use chainsearch_core::search::{IndexSchema, SearchBackend, SearchDocument};

#[derive(Default)]
struct MemoryIndex {
    schema: Option<IndexSchema>,
    documents: Vec<SearchDocument>,
}

/// In-memory search index.
///
/// Writes upsert by document id: a re-indexed document replaces the earlier
/// one in place. All data is lost when the process exits.
#[derive(Default)]
pub struct MemorySearchBackend {
    indexes: Mutex<HashMap<String, MemoryIndex>>,
    batches: Mutex<u64>,
}

impl MemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, MemoryIndex>>, IndexerError> {
        self.indexes
            .lock()
            .map_err(|e| IndexerError::Storage(format!("memory index poisoned: {e}")))
    }

    /// Documents of `index` in first-write order.
    pub fn documents(&self, index: &str) -> Vec<SearchDocument> {
        self.lock()
            .ok()
            .and_then(|i| i.get(index).map(|i| i.documents.clone()))
            .unwrap_or_default()
    }

    pub fn schema(&self, index: &str) -> Option<IndexSchema> {
        self.lock().ok()?.get(index)?.schema.clone()
    }

    /// Number of `write_batch` calls accepted so far.
    pub fn batch_count(&self) -> u64 {
        self.batches.lock().map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexerError> {
        Ok(self.lock()?.contains_key(name))
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexerError> {
        self.lock()?
            .entry(schema.name.clone())
            .or_default()
            .schema = Some(schema.clone());
        Ok(())
    }

    async fn write_batch(&self, index: &str, documents: &[SearchDocument]) -> Result<(), IndexerError> {
        let mut indexes = self.lock()?;
        let target = indexes
            .get_mut(index)
            .ok_or_else(|| IndexerError::Storage(format!("index {index} does not exist")))?;
        for doc in documents {
            match target.documents.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc.clone(),
                None => target.documents.push(doc.clone()),
            }
        }
        *self
            .batches
            .lock()
            .map_err(|e| IndexerError::Storage(format!("memory index poisoned: {e}")))? += 1;
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64, IndexerError> {
        Ok(self
            .lock()?
            .get(index)
            .map_or(0, |i| i.documents.len() as u64))
    }

    async fn delete_index(&self, name: &str) -> Result<(), IndexerError> {
        self.lock()?.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_index() {
        let backend = MemorySearchBackend::new();
        let err = backend
            .write_batch("missing", &[SearchDocument::new("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));
    }

    #[tokio::test]
    async fn upsert_keeps_first_write_order() {
        let backend = MemorySearchBackend::new();
        backend.create_index(&IndexSchema::new("transfers")).await.unwrap();

        backend
            .write_batch("transfers", &[SearchDocument::new("a"), SearchDocument::new("b")])
            .await
            .unwrap();
        backend
            .write_batch("transfers", &[SearchDocument::new("a").with_field("v", 2)])
            .await
            .unwrap();

        let docs = backend.documents("transfers");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[0].get("v"), Some(&serde_json::Value::from(2)));
        assert_eq!(backend.count("transfers").await.unwrap(), 2);
        assert_eq!(backend.batch_count(), 2);
    }

    #[tokio::test]
    async fn delete_drops_documents() {
        let backend = MemorySearchBackend::new();
        backend.create_index(&IndexSchema::new("x")).await.unwrap();
        backend.write_batch("x", &[SearchDocument::new("1")]).await.unwrap();
        assert!(backend.schema("x").is_some());

        backend.delete_index("x").await.unwrap();
        assert!(!backend.index_exists("x").await.unwrap());
        assert_eq!(backend.count("x").await.unwrap(), 0);
    }
}
