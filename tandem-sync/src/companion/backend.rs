//! Companion backend: mirrors the record set and pushes it to the partner.

use super::link::CompanionLink;
use super::payload::CompanionPayload;
use crate::adapter::BackendAdapter;
use crate::backend::{BackendKind, RecordBackend};
use crate::change::ChangeSet;
use crate::error::SyncResult;
use crate::reconcile;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tandem_types::{FieldMap, Record, RecordFactory, RecordKey};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often a context push is attempted before the commit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(250),
        }
    }
}

/// Backend whose medium is a paired device.
///
/// Every local add or delete pushes the full resulting record set to the
/// partner. Batches received from the partner are absorbed into the mirror
/// without being pushed back.
pub struct CompanionBackend {
    link: Arc<dyn CompanionLink>,
    mirror: Mutex<BTreeMap<RecordKey, Record>>,
    retry: RetryPolicy,
}

impl CompanionBackend {
    pub fn new(link: Arc<dyn CompanionLink>) -> Self {
        Self {
            link,
            mirror: Mutex::new(BTreeMap::new()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keys the partner was last told about (or told us about).
    pub fn mirrored_keys(&self) -> Vec<RecordKey> {
        self.mirror().keys().cloned().collect()
    }

    fn mirror(&self) -> std::sync::MutexGuard<'_, BTreeMap<RecordKey, Record>> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes the record set that results from `edit`, and keeps it only if
    /// the push succeeds.
    async fn push_with<F>(&self, edit: F) -> SyncResult<()>
    where
        F: FnOnce(&mut BTreeMap<RecordKey, Record>),
    {
        let mut next = self.mirror().clone();
        edit(&mut next);
        self.push(CompanionPayload::snapshot(next.values())).await?;
        *self.mirror() = next;
        Ok(())
    }

    async fn push(&self, payload: CompanionPayload) -> SyncResult<()> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.link.update_context(payload.clone()).await {
                Ok(()) => {
                    debug!("Pushed companion context with {} records", payload.len());
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!("Companion push attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Companion push failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl RecordBackend for CompanionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Companion
    }

    async fn load_all(&self, _entity_names: &[String]) -> SyncResult<Vec<FieldMap>> {
        Ok(self.mirror().values().map(Record::to_payload).collect())
    }

    async fn persist(&self, record: &Record) -> SyncResult<()> {
        let record = record.clone();
        self.push_with(move |mirror| {
            mirror.insert(record.key().clone(), record);
        })
        .await
    }

    async fn remove(&self, record: &Record) -> SyncResult<()> {
        let key = record.key().clone();
        self.push_with(move |mirror| {
            mirror.remove(&key);
        })
        .await
    }

    async fn absorb(&self, changes: &ChangeSet) -> SyncResult<()> {
        let mut mirror = self.mirror();
        for record in &changes.deletes {
            mirror.remove(record.key());
        }
        for record in &changes.adds {
            mirror.insert(record.key().clone(), record.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompanionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionBackend")
            .field("paired", &self.link.is_paired())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Applies a payload received from the partner.
///
/// `companion` absorbs the payload first, without pushing it back. Then
/// `target` (normally the preferred adapter) is reconciled so it holds
/// exactly the payload's keys. Observers of either adapter carry the changes
/// on from there. Returns the changes relative to what `target` held. A
/// payload without a snapshot changes nothing.
pub async fn receive_payload(
    companion: &dyn BackendAdapter,
    target: &dyn BackendAdapter,
    factory: &dyn RecordFactory,
    payload: CompanionPayload,
) -> SyncResult<ChangeSet> {
    let Some(records) = payload.decode(factory)? else {
        debug!("Companion payload from {} carries no records; ignoring", payload.timestamp);
        return Ok(ChangeSet::default());
    };
    debug!(
        "Received companion context from {} with {} records",
        payload.timestamp,
        records.len()
    );

    let held = target.enumerate_all().await?;
    let expected = reconcile::plan(&held, records.clone());

    if companion.id() == target.id() {
        return target.reconcile(records).await;
    }
    companion.reconcile(records.clone()).await?;
    target.reconcile(records).await?;
    Ok(expected)
}

/// Drains `inbox` through [`receive_payload`] until the channel closes.
pub fn spawn_listener(
    companion: Arc<dyn BackendAdapter>,
    target: Arc<dyn BackendAdapter>,
    factory: Arc<dyn RecordFactory>,
    mut inbox: mpsc::Receiver<CompanionPayload>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = inbox.recv().await {
            let sent = payload.timestamp.clone();
            match receive_payload(companion.as_ref(), target.as_ref(), factory.as_ref(), payload)
                .await
            {
                Ok(changes) if !changes.is_empty() => info!(
                    "Companion sync applied {} adds / {} deletes",
                    changes.adds.len(),
                    changes.deletes.len()
                ),
                Ok(_) => {}
                Err(e) => warn!("Failed to apply companion context from {}: {}", sent, e),
            }
        }
        debug!("Companion inbox closed; listener exiting");
    })
}
