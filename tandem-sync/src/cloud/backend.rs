//! Remote backend over a [`CloudStore`].

use super::storage::CloudStore;
use crate::backend::{BackendKind, RecordBackend};
use crate::error::SyncResult;
use async_trait::async_trait;
use std::sync::Arc;
use tandem_types::{FieldMap, Record};
use tracing::{debug, warn};

/// Stores each record as one JSON document in a remote store.
#[derive(Clone)]
pub struct CloudBackend {
    store: Arc<dyn CloudStore>,
}

impl CloudBackend {
    pub fn new(store: Arc<dyn CloudStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CloudStore> {
        &self.store
    }
}

#[async_trait]
impl RecordBackend for CloudBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn load_all(&self, entity_names: &[String]) -> SyncResult<Vec<FieldMap>> {
        let mut payloads = Vec::new();
        for entity in entity_names {
            for document in self.store.list(entity).await? {
                match serde_json::from_slice::<FieldMap>(&document) {
                    Ok(payload) => payloads.push(payload),
                    Err(e) => warn!(
                        "Skipping unreadable {} document in {}: {}",
                        entity,
                        self.store.provider_name(),
                        e
                    ),
                }
            }
        }
        debug!("Loaded {} documents from {}", payloads.len(), self.store.provider_name());
        Ok(payloads)
    }

    async fn persist(&self, record: &Record) -> SyncResult<()> {
        let document = serde_json::to_vec(&record.to_payload())?;
        self.store
            .put(record.entity_name(), record.key(), &document)
            .await
    }

    async fn remove(&self, record: &Record) -> SyncResult<()> {
        self.store.remove(record.entity_name(), record.key()).await
    }
}

impl std::fmt::Debug for CloudBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudBackend")
            .field("provider", &self.store.provider_name())
            .finish()
    }
}
