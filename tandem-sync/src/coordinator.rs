//! Storage coordinator: routes application calls to the preferred adapter
//! and fans committed changes out to every other adapter.
//!
//! The coordinator registers itself as an observer on each adapter. When
//! adapter S commits a change, the coordinator hands it to every adapter
//! except S through `accept_external_update`. Those adapters dedup by key,
//! so the echoes their own commits cause end at S as no-ops.

use crate::adapter::{BackendAdapter, ReplicatedAdapter};
use crate::backend::BackendKind;
use crate::change::ChangeSet;
use crate::cloud::{CloudBackend, CloudStore, FolderCloudStore, MemoryCloudStore};
use crate::companion::{
    CompanionBackend, CompanionLink, CompanionPayload, NullLink, receive_payload, spawn_listener,
};
use crate::config::CoordinatorConfig;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalBackend;
use crate::observer::{ChangeObserver, ObserverRegistry, SubscriptionId};
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tandem_storage::DEFAULT_DB_FILE;
use tandem_types::{AdapterId, Record, RecordFactory};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Builds the adapter for one configured backend kind.
pub async fn build_adapter(
    kind: BackendKind,
    config: &CoordinatorConfig,
    factory: Arc<dyn RecordFactory>,
) -> SyncResult<Arc<dyn BackendAdapter>> {
    let options = &config.settings.options;
    let adapter_options = options.adapter_options();

    let adapter: Arc<dyn BackendAdapter> = match kind {
        BackendKind::Local => {
            let backend = if options.uses_in_memory_local() {
                LocalBackend::in_memory()?
            } else {
                let path = options
                    .local_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
                LocalBackend::open(path).await?
            };
            Arc::new(ReplicatedAdapter::with_options(backend, factory, adapter_options))
        }
        BackendKind::Remote => {
            let store: Arc<dyn CloudStore> = if let Some(store) = &config.cloud_store {
                store.clone()
            } else if options.uses_in_memory_cloud() {
                Arc::new(MemoryCloudStore::new())
            } else if let Some(folder) = &options.cloud_folder {
                Arc::new(FolderCloudStore::new(folder.clone()))
            } else {
                return Err(SyncError::InvalidConfig(
                    "remote backend needs a cloud store, cloud_folder, or cloud_in_memory".into(),
                ));
            };
            Arc::new(ReplicatedAdapter::with_options(
                CloudBackend::new(store),
                factory,
                adapter_options,
            ))
        }
        BackendKind::Companion => {
            let link: Arc<dyn CompanionLink> = match &config.companion_link {
                Some(link) => link.clone(),
                None => Arc::new(NullLink),
            };
            let backend = CompanionBackend::new(link).with_retry(options.companion_retry());
            Arc::new(ReplicatedAdapter::with_options(backend, factory, adapter_options))
        }
    };

    info!("Built {} adapter {}", kind, adapter.id());
    Ok(adapter)
}

/// The part of the coordinator adapters hold (weakly) as their observer.
struct FanOut {
    adapters: Vec<Arc<dyn BackendAdapter>>,
    preferred: usize,
    app_observers: ObserverRegistry,
}

impl FanOut {
    fn preferred(&self) -> &Arc<dyn BackendAdapter> {
        &self.adapters[self.preferred]
    }
}

#[async_trait]
impl ChangeObserver for FanOut {
    async fn on_change(&self, source: AdapterId, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }

        for adapter in self.adapters.iter().filter(|a| a.id() != source) {
            let applied = adapter.accept_external_update(source, changes).await;
            debug!(
                "Fan-out {} -> {} ({}): {} of {} applied",
                source,
                adapter.id(),
                adapter.kind(),
                applied,
                changes.len()
            );
        }

        if self.preferred().id() == source {
            self.app_observers.notify(source, changes).await;
        }
    }
}

/// Coordinates a fixed set of adapters, one of them preferred.
pub struct StorageCoordinator {
    fan_out: Arc<FanOut>,
    factory: Arc<dyn RecordFactory>,
    operation_timeout: Option<Duration>,
    /// (adapter index, subscription) pairs, emptied by `shutdown`.
    subscriptions: Mutex<Vec<(usize, SubscriptionId)>>,
    /// Observers handed over by value, kept alive for the coordinator's life.
    retained: Mutex<Vec<Arc<dyn ChangeObserver>>>,
}

impl StorageCoordinator {
    /// Builds every configured backend and wires them together.
    pub async fn new(config: CoordinatorConfig) -> SyncResult<Self> {
        let (factory, preferred) = config.validate()?;

        let mut adapters = Vec::with_capacity(config.settings.backends.len());
        for kind in &config.settings.backends {
            adapters.push(build_adapter(*kind, &config, factory.clone()).await?);
        }

        let coordinator = Self::with_adapters(adapters, preferred, factory)?
            .with_operation_timeout(config.settings.options.operation_timeout());
        if let Some(observer) = config.app_observer {
            coordinator.subscribe_owned(observer);
        }
        Ok(coordinator)
    }

    /// Wires already-built adapters. `preferred` indexes into `adapters`.
    pub fn with_adapters(
        adapters: Vec<Arc<dyn BackendAdapter>>,
        preferred: usize,
        factory: Arc<dyn RecordFactory>,
    ) -> SyncResult<Self> {
        if preferred >= adapters.len() {
            return Err(SyncError::MissingPreferredBackend);
        }

        let fan_out = Arc::new(FanOut {
            adapters,
            preferred,
            app_observers: ObserverRegistry::new(),
        });

        let as_observer: Arc<dyn ChangeObserver> = fan_out.clone();
        let subscriptions = fan_out
            .adapters
            .iter()
            .enumerate()
            .map(|(index, adapter)| (index, adapter.register_observer(&as_observer)))
            .collect();

        info!(
            "Storage coordinator ready with {} adapters; preferred {} ({})",
            fan_out.adapters.len(),
            fan_out.preferred().id(),
            fan_out.preferred().kind()
        );

        Ok(Self {
            fan_out,
            factory,
            operation_timeout: None,
            subscriptions: Mutex::new(subscriptions),
            retained: Mutex::new(Vec::new()),
        })
    }

    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn BackendAdapter>] {
        &self.fan_out.adapters
    }

    pub fn preferred(&self) -> &Arc<dyn BackendAdapter> {
        self.fan_out.preferred()
    }

    /// First adapter of the given kind.
    pub fn adapter(&self, kind: BackendKind) -> Option<&Arc<dyn BackendAdapter>> {
        self.fan_out.adapters.iter().find(|a| a.kind() == kind)
    }

    pub fn record_factory(&self) -> &Arc<dyn RecordFactory> {
        &self.factory
    }

    /// Runs `operation` against the preferred adapter on its own task. A
    /// commit that has started always finishes; the timeout and the
    /// caller dropping this future only end the wait.
    async fn run<T, F, Fut>(&self, name: &str, operation: F) -> SyncResult<T>
    where
        F: FnOnce(Arc<dyn BackendAdapter>) -> Fut,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::spawn(operation(self.preferred().clone()));
        let joined = match self.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Coordinator {} timed out after {:?}; left running", name, limit);
                    return Err(SyncError::Timeout);
                }
            },
            None => task.await,
        };
        joined?
    }

    /// Adds a record through the preferred adapter. Returns whether it was
    /// new.
    pub async fn add(&self, record: Record) -> SyncResult<bool> {
        self.run("add", move |adapter| async move { adapter.add_record(record).await })
            .await
    }

    /// Deletes a record through the preferred adapter. Returns whether it
    /// was present.
    pub async fn delete(&self, record: &Record) -> SyncResult<bool> {
        let record = record.clone();
        self.run("delete", move |adapter| async move { adapter.delete_record(&record).await })
            .await
    }

    /// All records held by the preferred adapter.
    pub async fn get(&self) -> SyncResult<Vec<Record>> {
        self.run("get", |adapter| async move { adapter.enumerate_all().await })
            .await
    }

    /// Reconciles the preferred adapter against `snapshot`; the resulting
    /// changes fan out like any other commit.
    pub async fn reconcile(&self, snapshot: Vec<Record>) -> SyncResult<ChangeSet> {
        self.run("reconcile", move |adapter| async move { adapter.reconcile(snapshot).await })
            .await
    }

    /// Loads every adapter so pre-existing records are shared now rather
    /// than on first use. Failures are logged.
    pub async fn prime(&self) {
        for adapter in self.adapters() {
            match adapter.enumerate_all().await {
                Ok(records) => debug!(
                    "Primed {} ({}) with {} records",
                    adapter.id(),
                    adapter.kind(),
                    records.len()
                ),
                Err(e) => warn!("Failed to prime {} ({}): {}", adapter.id(), adapter.kind(), e),
            }
        }
    }

    /// Forces every adapter to reload on next access.
    pub async fn invalidate_all(&self) {
        for adapter in self.adapters() {
            adapter.invalidate().await;
        }
    }

    /// Subscribes an application observer to changes committed to the
    /// preferred backend. The observer is held weakly.
    pub fn subscribe(&self, observer: &Arc<dyn ChangeObserver>) -> SubscriptionId {
        self.fan_out.app_observers.register(observer)
    }

    /// Like [`subscribe`](Self::subscribe), but the coordinator keeps the
    /// observer alive.
    pub fn subscribe_owned(&self, observer: Arc<dyn ChangeObserver>) -> SubscriptionId {
        let id = self.subscribe(&observer);
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.fan_out.app_observers.unregister(id)
    }

    /// Applies a payload received from a companion device. The preferred
    /// adapter ends up holding exactly the payload's keys, and the changes
    /// fan out to every other adapter. Fails with `InvalidConfig` if there
    /// is no companion backend.
    pub async fn receive_companion_payload(
        &self,
        payload: CompanionPayload,
    ) -> SyncResult<ChangeSet> {
        let companion = self.companion()?;
        let factory = self.factory.clone();
        self.run("companion payload", move |preferred| async move {
            receive_payload(companion.as_ref(), preferred.as_ref(), factory.as_ref(), payload)
                .await
        })
        .await
    }

    /// Spawns a task that applies every payload from `inbox` the way
    /// [`receive_companion_payload`](Self::receive_companion_payload) does.
    /// Returns `None` if there is no companion backend.
    pub fn spawn_companion_listener(
        &self,
        inbox: mpsc::Receiver<CompanionPayload>,
    ) -> Option<JoinHandle<()>> {
        let companion = self.companion().ok()?;
        Some(spawn_listener(
            companion,
            self.preferred().clone(),
            self.factory.clone(),
            inbox,
        ))
    }

    fn companion(&self) -> SyncResult<Arc<dyn BackendAdapter>> {
        self.adapter(BackendKind::Companion)
            .cloned()
            .ok_or_else(|| SyncError::InvalidConfig("no companion backend configured".into()))
    }

    /// Detaches the coordinator from its adapters. Later commits no longer
    /// fan out. Calling it again does nothing.
    pub fn shutdown(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if subscriptions.is_empty() {
            return;
        }
        for (index, id) in subscriptions {
            self.fan_out.adapters[index].unregister_observer(id);
        }
        info!("Storage coordinator shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Drop for StorageCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StorageCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<BackendKind> = self.adapters().iter().map(|a| a.kind()).collect();
        f.debug_struct("StorageCoordinator")
            .field("adapters", &kinds)
            .field("preferred", &self.fan_out.preferred)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

/// Holds at most one configured coordinator.
///
/// The composition root owns a slot (or uses [`CoordinatorSlot::global`]).
/// `configure` fills it once; `reset` empties it so it can be configured
/// again.
pub struct CoordinatorSlot {
    current: tokio::sync::Mutex<Option<Arc<StorageCoordinator>>>,
}

impl CoordinatorSlot {
    pub const fn new() -> Self {
        Self {
            current: tokio::sync::Mutex::const_new(None),
        }
    }

    /// The process-wide slot.
    pub fn global() -> &'static CoordinatorSlot {
        static GLOBAL: CoordinatorSlot = CoordinatorSlot::new();
        &GLOBAL
    }

    /// Builds a coordinator from `config` and stores it.
    pub async fn configure(
        &self,
        config: CoordinatorConfig,
    ) -> SyncResult<Arc<StorageCoordinator>> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Err(SyncError::AlreadyInitialized);
        }
        let coordinator = Arc::new(StorageCoordinator::new(config).await?);
        *current = Some(coordinator.clone());
        Ok(coordinator)
    }

    /// Stores a coordinator built elsewhere.
    pub async fn install(
        &self,
        coordinator: StorageCoordinator,
    ) -> SyncResult<Arc<StorageCoordinator>> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Err(SyncError::AlreadyInitialized);
        }
        let coordinator = Arc::new(coordinator);
        *current = Some(coordinator.clone());
        Ok(coordinator)
    }

    pub async fn get(&self) -> Option<Arc<StorageCoordinator>> {
        self.current.lock().await.clone()
    }

    pub async fn is_configured(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Takes the coordinator out and shuts it down. Returns whether one was
    /// configured.
    pub async fn reset(&self) -> bool {
        let taken = self.current.lock().await.take();
        match taken {
            Some(coordinator) => {
                coordinator.shutdown();
                true
            }
            None => false,
        }
    }
}

impl Default for CoordinatorSlot {
    fn default() -> Self {
        Self::new()
    }
}
