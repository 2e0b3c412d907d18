//! Backend adapters: a cache, a backend, and an observer registry.
//!
//! [`ReplicatedAdapter`] is the one place where the replication rules live:
//!
//! 1. The cache is loaded lazily, on the first call that needs it.
//! 2. An add whose key is already cached is a no-op, as is a delete whose
//!    key is not cached. No-ops commit nothing and notify nobody.
//! 3. Observers hear about a change only after it has been applied, and
//!    only after the cache lock has been released.
//!
//! Every operation holds the cache lock from its dedup check through the
//! cache update, so concurrent calls on one adapter never interleave.

use crate::backend::{BackendKind, RecordBackend};
use crate::cache::ReplicationCache;
use crate::change::ChangeSet;
use crate::error::{SyncError, SyncResult};
use crate::observer::{ChangeObserver, ObserverRegistry, SubscriptionId};
use crate::reconcile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tandem_types::{AdapterId, FieldMap, Record, RecordError, RecordFactory, RecordKey};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// When the cache is updated relative to the backend commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Commit to the backend first. A failed commit leaves the cache as it
    /// was.
    #[default]
    Confirmed,
    /// Update the cache first. A failed commit is reported but the cache
    /// keeps the change until the next reload.
    Speculative,
}

/// Per-adapter behavior knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    pub commit_mode: CommitMode,
    /// Reload the cache from the backend once it is this old.
    pub cache_ttl: Option<Duration>,
    /// Announce records found by a load to observers, as adds.
    pub share_on_load: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::Confirmed,
            cache_ttl: None,
            share_on_load: true,
        }
    }
}

/// One backend as seen by the coordinator.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn id(&self) -> AdapterId;

    fn kind(&self) -> BackendKind;

    /// Adds a record unless its key is already present. Returns whether the
    /// record was new. Fails for entities the record factory does not list.
    async fn add_record(&self, record: Record) -> SyncResult<bool>;

    /// Deletes the cached record with this key, if any. Returns whether a
    /// record was removed.
    async fn delete_record(&self, record: &Record) -> SyncResult<bool>;

    /// Every record currently known to the adapter.
    async fn enumerate_all(&self) -> SyncResult<Vec<Record>>;

    /// Applies a change committed by another adapter, adds first. Returns
    /// how many records actually changed. Individual failures are logged.
    async fn accept_external_update(&self, source: AdapterId, changes: &ChangeSet) -> usize;

    /// Makes the adapter hold exactly the keys in `snapshot` and returns
    /// the changes that were applied.
    async fn reconcile(&self, snapshot: Vec<Record>) -> SyncResult<ChangeSet>;

    /// Forces a reload from the backend on the next access.
    async fn invalidate(&self);

    fn register_observer(&self, observer: &Arc<dyn ChangeObserver>) -> SubscriptionId;

    fn unregister_observer(&self, id: SubscriptionId) -> bool;
}

/// Generic [`BackendAdapter`] over any [`RecordBackend`].
pub struct ReplicatedAdapter<B: RecordBackend> {
    id: AdapterId,
    backend: B,
    factory: Arc<dyn RecordFactory>,
    options: AdapterOptions,
    cache: Mutex<ReplicationCache>,
    observers: ObserverRegistry,
}

impl<B: RecordBackend> ReplicatedAdapter<B> {
    pub fn new(backend: B, factory: Arc<dyn RecordFactory>) -> Self {
        Self::with_options(backend, factory, AdapterOptions::default())
    }

    pub fn with_options(
        backend: B,
        factory: Arc<dyn RecordFactory>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            id: AdapterId::new(),
            cache: Mutex::new(ReplicationCache::new(options.cache_ttl)),
            backend,
            factory,
            options,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Keys currently cached, without triggering a load.
    pub async fn cached_keys(&self) -> Vec<RecordKey> {
        self.cache.lock().await.keys()
    }

    /// Loads the cache if needed. Returns what the load changed, for
    /// announcing once the lock is released.
    async fn prepare(&self, cache: &mut ReplicationCache) -> Option<ChangeSet> {
        if cache.is_populated() {
            return None;
        }

        let entity_names = self.factory.entity_names();
        let loaded = match self.backend.load_all(&entity_names).await {
            Ok(payloads) => self.decode(payloads),
            Err(e) => {
                let err = SyncError::BackendPopulation {
                    backend: self.kind(),
                    reason: e.to_string(),
                };
                warn!("{}; continuing with an empty cache", err);
                Vec::new()
            }
        };

        let diff = cache.populate(loaded);
        info!(
            "Adapter {} ({}) loaded {} records ({} new, {} gone)",
            self.id,
            self.kind(),
            cache.len(),
            diff.adds.len(),
            diff.deletes.len()
        );

        self.options.share_on_load.then_some(diff)
    }

    fn decode(&self, payloads: Vec<FieldMap>) -> Vec<Record> {
        payloads
            .iter()
            .filter_map(|payload| match self.factory.from_payload(payload) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        "Adapter {} ({}) skipping undecodable payload: {}",
                        self.id,
                        self.kind(),
                        e
                    );
                    None
                }
            })
            .collect()
    }

    fn commit_error(&self, e: SyncError) -> SyncError {
        let err = SyncError::BackendCommit {
            backend: self.kind(),
            reason: e.to_string(),
        };
        warn!("Adapter {}: {}", self.id, err);
        err
    }

    async fn publish(&self, changes: Option<ChangeSet>) {
        if let Some(changes) = changes {
            self.observers.notify(self.id, &changes).await;
        }
    }

    async fn commit_add(&self, cache: &mut ReplicationCache, record: &Record) -> SyncResult<()> {
        match self.options.commit_mode {
            CommitMode::Confirmed => {
                self.backend.persist(record).await.map_err(|e| self.commit_error(e))?;
                cache.insert(record.clone());
            }
            CommitMode::Speculative => {
                cache.insert(record.clone());
                self.backend.persist(record).await.map_err(|e| self.commit_error(e))?;
            }
        }
        Ok(())
    }

    async fn commit_delete(&self, cache: &mut ReplicationCache, record: &Record) -> SyncResult<()> {
        match self.options.commit_mode {
            CommitMode::Confirmed => {
                self.backend.remove(record).await.map_err(|e| self.commit_error(e))?;
                cache.remove(record.key());
            }
            CommitMode::Speculative => {
                cache.remove(record.key());
                self.backend.remove(record).await.map_err(|e| self.commit_error(e))?;
            }
        }
        Ok(())
    }

    async fn commit_batch(
        &self,
        cache: &mut ReplicationCache,
        changes: &ChangeSet,
    ) -> SyncResult<()> {
        match self.options.commit_mode {
            CommitMode::Confirmed => {
                self.backend.absorb(changes).await.map_err(|e| self.commit_error(e))?;
                cache.apply(changes);
            }
            CommitMode::Speculative => {
                cache.apply(changes);
                self.backend.absorb(changes).await.map_err(|e| self.commit_error(e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<B: RecordBackend> BackendAdapter for ReplicatedAdapter<B> {
    fn id(&self) -> AdapterId {
        self.id
    }

    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    async fn add_record(&self, record: Record) -> SyncResult<bool> {
        // Loads only enumerate the factory's entities, so anything else would
        // be stored but never read back.
        let entity = record.entity_name();
        if !self.factory.entity_names().iter().any(|n| n == entity) {
            warn!(
                "Adapter {} ({}) rejecting {}: unknown entity",
                self.id,
                self.kind(),
                record.key()
            );
            return Err(RecordError::UnknownEntity(entity.to_string()).into());
        }

        let mut cache = self.cache.lock().await;
        let loaded = self.prepare(&mut cache).await;

        let outcome = if cache.contains(record.key()) {
            debug!("Adapter {} ({}) already holds {}", self.id, self.kind(), record.key());
            Ok(false)
        } else {
            self.commit_add(&mut cache, &record).await.map(|()| true)
        };
        drop(cache);

        self.publish(loaded).await;
        if matches!(outcome, Ok(true)) {
            debug!("Adapter {} ({}) added {}", self.id, self.kind(), record.key());
            self.observers.notify(self.id, &ChangeSet::added(record)).await;
        }
        outcome
    }

    async fn delete_record(&self, record: &Record) -> SyncResult<bool> {
        let mut cache = self.cache.lock().await;
        let loaded = self.prepare(&mut cache).await;

        let (outcome, removed) = match cache.get(record.key()).cloned() {
            None => {
                debug!("Adapter {} ({}) does not hold {}", self.id, self.kind(), record.key());
                (Ok(false), None)
            }
            Some(cached) => match self.commit_delete(&mut cache, &cached).await {
                Ok(()) => (Ok(true), Some(cached)),
                Err(e) => (Err(e), None),
            },
        };
        drop(cache);

        self.publish(loaded).await;
        if let Some(removed) = removed {
            debug!("Adapter {} ({}) deleted {}", self.id, self.kind(), removed.key());
            self.observers.notify(self.id, &ChangeSet::deleted(removed)).await;
        }
        outcome
    }

    async fn enumerate_all(&self) -> SyncResult<Vec<Record>> {
        let mut cache = self.cache.lock().await;
        let loaded = self.prepare(&mut cache).await;
        let records = cache.records();
        drop(cache);

        self.publish(loaded).await;
        Ok(records)
    }

    async fn accept_external_update(&self, source: AdapterId, changes: &ChangeSet) -> usize {
        debug!(
            "Adapter {} ({}) accepting {} adds / {} deletes from {}",
            self.id,
            self.kind(),
            changes.adds.len(),
            changes.deletes.len(),
            source
        );

        let mut applied = 0;
        for record in &changes.adds {
            match self.add_record(record.clone()).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Adapter {} failed to apply add of {}: {}",
                    self.id,
                    record.key(),
                    e
                ),
            }
        }
        for record in &changes.deletes {
            match self.delete_record(record).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Adapter {} failed to apply delete of {}: {}",
                    self.id,
                    record.key(),
                    e
                ),
            }
        }
        applied
    }

    async fn reconcile(&self, snapshot: Vec<Record>) -> SyncResult<ChangeSet> {
        let mut cache = self.cache.lock().await;
        let loaded = self.prepare(&mut cache).await;

        let plan = reconcile::plan(cache.values(), snapshot);
        let outcome = if plan.is_empty() {
            Ok(())
        } else {
            self.commit_batch(&mut cache, &plan).await
        };
        drop(cache);

        self.publish(loaded).await;
        outcome?;
        info!(
            "Adapter {} ({}) reconciled: {} added, {} deleted",
            self.id,
            self.kind(),
            plan.adds.len(),
            plan.deletes.len()
        );
        self.observers.notify(self.id, &plan).await;
        Ok(plan)
    }

    async fn invalidate(&self) {
        self.cache.lock().await.invalidate();
        debug!("Adapter {} ({}) cache invalidated", self.id, self.kind());
    }

    fn register_observer(&self, observer: &Arc<dyn ChangeObserver>) -> SubscriptionId {
        self.observers.register(observer)
    }

    fn unregister_observer(&self, id: SubscriptionId) -> bool {
        self.observers.unregister(id)
    }
}

impl<B: RecordBackend> std::fmt::Debug for ReplicatedAdapter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedAdapter")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
