//! The storage backend seam.
//!
//! A [`RecordBackend`] knows how to store, remove, and enumerate record
//! payloads in one concrete medium. Caching, deduplication, and observer
//! notification live in [`crate::ReplicatedAdapter`], so a backend only has
//! to do the medium-specific work.

use crate::change::ChangeSet;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tandem_types::{FieldMap, Record};

/// The kinds of backend a coordinator can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// On-device SQLite store.
    Local,
    /// Remote document store (a synced folder or an object store).
    Remote,
    /// Paired companion device.
    Companion,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Local, Self::Remote, Self::Companion];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Companion => "companion",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "core_data" | "coredata" => Ok(Self::Local),
            "remote" | "cloud" | "cloud_kit" | "cloudkit" => Ok(Self::Remote),
            "companion" | "watch" | "watch_connectivity" => Ok(Self::Companion),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown backend kind: {other}"
            ))),
        }
    }
}

/// Medium-specific record storage.
///
/// Implementations must be safe to call concurrently, although the owning
/// adapter never issues overlapping calls.
#[async_trait]
pub trait RecordBackend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Reads every stored payload belonging to one of `entity_names`.
    async fn load_all(&self, entity_names: &[String]) -> SyncResult<Vec<FieldMap>>;

    /// Durably stores a record, replacing any record with the same key.
    async fn persist(&self, record: &Record) -> SyncResult<()>;

    /// Removes a record. Removing a record that is not stored succeeds.
    async fn remove(&self, record: &Record) -> SyncResult<()>;

    /// Applies a reconciliation batch: deletes first, then adds.
    ///
    /// Backends that mirror a remote party override this when the batch
    /// came from that party and must not be echoed back.
    async fn absorb(&self, changes: &ChangeSet) -> SyncResult<()> {
        for record in &changes.deletes {
            self.remove(record).await?;
        }
        for record in &changes.adds {
            self.persist(record).await?;
        }
        Ok(())
    }
}
