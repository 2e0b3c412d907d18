//! Remote document store abstraction.
//!
//! A remote backend keeps one document per record, grouped by entity name.
//! Documents are the record's JSON payload.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tandem_types::RecordKey;

/// Configuration shared by remote document stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudStoreConfig {
    /// Sub-folder (or key prefix) under the store root that holds documents.
    pub sync_folder: String,
    /// Largest document accepted on write or read (in bytes).
    pub max_document_size: u64,
}

impl Default for CloudStoreConfig {
    fn default() -> Self {
        Self {
            sync_folder: "Tandem/records".to_string(),
            max_document_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

/// Abstract remote document store.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Returns the name of the store provider.
    fn provider_name(&self) -> &'static str;

    /// Writes (or overwrites) the document for `key` under `entity`.
    async fn put(&self, entity: &str, key: &RecordKey, document: &[u8]) -> SyncResult<()>;

    /// Removes the document for `key`. Removing a missing document succeeds.
    async fn remove(&self, entity: &str, key: &RecordKey) -> SyncResult<()>;

    /// Reads every document stored under `entity`.
    async fn list(&self, entity: &str) -> SyncResult<Vec<Vec<u8>>>;
}
