//! On-device backend over the SQLite [`RecordStore`].

use crate::backend::{BackendKind, RecordBackend};
use crate::error::SyncResult;
use async_trait::async_trait;
use std::path::PathBuf;
use tandem_storage::RecordStore;
use tandem_types::{FieldMap, Record};
use tracing::debug;

/// Local backend. Store calls block, so each one runs on
/// `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    store: RecordStore,
}

impl LocalBackend {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Opens (or creates) an on-disk store.
    pub async fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let store = tokio::task::spawn_blocking(move || RecordStore::open(path)).await??;
        Ok(Self::new(store))
    }

    pub fn in_memory() -> SyncResult<Self> {
        Ok(Self::new(RecordStore::open_in_memory()?))
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}

#[async_trait]
impl RecordBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn load_all(&self, entity_names: &[String]) -> SyncResult<Vec<FieldMap>> {
        let store = self.store.clone();
        let entity_names = entity_names.to_vec();
        let payloads = tokio::task::spawn_blocking(move || {
            let mut payloads = Vec::new();
            for entity in &entity_names {
                payloads.extend(store.load_entity(entity)?);
            }
            Ok::<_, tandem_storage::StorageError>(payloads)
        })
        .await??;
        debug!("Loaded {} local payloads", payloads.len());
        Ok(payloads)
    }

    async fn persist(&self, record: &Record) -> SyncResult<()> {
        let store = self.store.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.save(&record)).await??;
        Ok(())
    }

    async fn remove(&self, record: &Record) -> SyncResult<()> {
        let store = self.store.clone();
        let entity = record.entity_name().to_string();
        let key = record.key().clone();
        tokio::task::spawn_blocking(move || store.delete(&entity, &key)).await??;
        Ok(())
    }
}
