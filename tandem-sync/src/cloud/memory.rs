//! In-process remote store, for tests and ephemeral setups.

use super::storage::CloudStore;
use crate::error::SyncResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tandem_types::RecordKey;
use tokio::sync::RwLock;

/// Remote store that keeps documents in memory.
#[derive(Debug, Default)]
pub struct MemoryCloudStore {
    documents: RwLock<BTreeMap<(String, RecordKey), Vec<u8>>>,
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all entities.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn contains(&self, entity: &str, key: &RecordKey) -> bool {
        self.documents
            .read()
            .await
            .contains_key(&(entity.to_string(), key.clone()))
    }
}

#[async_trait]
impl CloudStore for MemoryCloudStore {
    fn provider_name(&self) -> &'static str {
        "Memory"
    }

    async fn put(&self, entity: &str, key: &RecordKey, document: &[u8]) -> SyncResult<()> {
        self.documents
            .write()
            .await
            .insert((entity.to_string(), key.clone()), document.to_vec());
        Ok(())
    }

    async fn remove(&self, entity: &str, key: &RecordKey) -> SyncResult<()> {
        self.documents
            .write()
            .await
            .remove(&(entity.to_string(), key.clone()));
        Ok(())
    }

    async fn list(&self, entity: &str) -> SyncResult<Vec<Vec<u8>>> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|((e, _), _)| e == entity)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}
