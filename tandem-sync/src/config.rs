//! Coordinator configuration.
//!
//! [`SyncSettings`] is the serializable part (which backends, which one is
//! preferred, tuning options). [`CoordinatorConfig`] adds the runtime
//! collaborators that cannot be serialized: the record factory and optional
//! injected stores, links, and the application observer.

use crate::adapter::{AdapterOptions, CommitMode};
use crate::backend::BackendKind;
use crate::cloud::CloudStore;
use crate::companion::{CompanionLink, RetryPolicy};
use crate::error::{SyncError, SyncResult};
use crate::observer::ChangeObserver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tandem_types::RecordFactory;

/// Option key that puts every backend that supports it in memory.
pub const IN_MEMORY_OPTION: &str = "in_memory";

/// Tuning options shared by all backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// Use an in-memory SQLite store for the local backend.
    pub local_in_memory: bool,
    /// Path of the on-disk local store.
    pub local_path: Option<PathBuf>,
    /// Root of the synced folder used by the remote backend.
    pub cloud_folder: Option<PathBuf>,
    /// Use an in-process remote store.
    pub cloud_in_memory: bool,
    pub commit_mode: CommitMode,
    pub cache_ttl_secs: Option<u64>,
    /// Upper bound on a single coordinator operation.
    pub operation_timeout_ms: Option<u64>,
    pub share_on_load: bool,
    pub companion_retry_attempts: u32,
    pub companion_retry_delay_ms: u64,
    /// Free-form options, e.g. `in_memory = "true"`.
    pub extra: BTreeMap<String, String>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            local_in_memory: false,
            local_path: None,
            cloud_folder: None,
            cloud_in_memory: false,
            commit_mode: CommitMode::Confirmed,
            cache_ttl_secs: None,
            operation_timeout_ms: None,
            share_on_load: true,
            companion_retry_attempts: 3,
            companion_retry_delay_ms: 250,
            extra: BTreeMap::new(),
        }
    }
}

impl BackendOptions {
    /// Options for an all-in-memory setup, used by tests and previews.
    pub fn in_memory() -> Self {
        Self {
            local_in_memory: true,
            cloud_in_memory: true,
            ..Self::default()
        }
    }

    /// Reads a boolean entry from `extra`. Accepts `true`, `yes`, `on`
    /// and `1`.
    pub fn flag(&self, name: &str) -> bool {
        self.extra.get(name).is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "on" | "1")
        })
    }

    pub fn uses_in_memory_local(&self) -> bool {
        self.local_in_memory || self.flag(IN_MEMORY_OPTION)
    }

    pub fn uses_in_memory_cloud(&self) -> bool {
        self.cloud_in_memory || self.flag(IN_MEMORY_OPTION)
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            commit_mode: self.commit_mode,
            cache_ttl: self.cache_ttl_secs.map(Duration::from_secs),
            share_on_load: self.share_on_load,
        }
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn companion_retry(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.companion_retry_attempts,
            delay: Duration::from_millis(self.companion_retry_delay_ms),
        }
    }
}

/// Serializable coordinator settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Backends to build, in order. The order is also fan-out order.
    pub backends: Vec<BackendKind>,
    /// Backend treated as authoritative for reads. Defaults to the first.
    pub preferred: Option<BackendKind>,
    pub options: BackendOptions,
}

impl SyncSettings {
    pub fn new(backends: impl IntoIterator<Item = BackendKind>) -> Self {
        Self {
            backends: backends.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_preferred(mut self, kind: BackendKind) -> Self {
        self.preferred = Some(kind);
        self
    }

    pub fn with_options(mut self, options: BackendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Index into `backends` of the preferred backend.
    ///
    /// An explicit preference must name a configured backend (the first
    /// one of that kind). Without one, the first backend is preferred.
    pub fn preferred_index(&self) -> SyncResult<usize> {
        match self.preferred {
            Some(kind) => self
                .backends
                .iter()
                .position(|k| *k == kind)
                .ok_or(SyncError::MissingPreferredBackend),
            None if self.backends.is_empty() => Err(SyncError::MissingPreferredBackend),
            None => Ok(0),
        }
    }
}

/// Everything needed to build a [`crate::StorageCoordinator`].
#[derive(Clone, Default)]
pub struct CoordinatorConfig {
    pub settings: SyncSettings,
    pub record_factory: Option<Arc<dyn RecordFactory>>,
    /// Remote store to use instead of one built from the options.
    pub cloud_store: Option<Arc<dyn CloudStore>>,
    /// Companion link. Without one the companion backend is unpaired.
    pub companion_link: Option<Arc<dyn CompanionLink>>,
    /// Receives changes committed to the preferred backend.
    pub app_observer: Option<Arc<dyn ChangeObserver>>,
}

impl CoordinatorConfig {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn with_record_factory(mut self, factory: Arc<dyn RecordFactory>) -> Self {
        self.record_factory = Some(factory);
        self
    }

    pub fn with_cloud_store(mut self, store: Arc<dyn CloudStore>) -> Self {
        self.cloud_store = Some(store);
        self
    }

    pub fn with_companion_link(mut self, link: Arc<dyn CompanionLink>) -> Self {
        self.companion_link = Some(link);
        self
    }

    pub fn with_app_observer(mut self, observer: Arc<dyn ChangeObserver>) -> Self {
        self.app_observer = Some(observer);
        self
    }

    /// Checks the configuration and returns the record factory and the
    /// preferred backend index.
    pub fn validate(&self) -> SyncResult<(Arc<dyn RecordFactory>, usize)> {
        if !self.settings.backends.is_empty() && self.record_factory.is_none() {
            return Err(SyncError::MissingObjectFactory);
        }
        let preferred = self.settings.preferred_index()?;
        let factory = self
            .record_factory
            .clone()
            .ok_or(SyncError::MissingObjectFactory)?;
        Ok((factory, preferred))
    }
}

impl std::fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("settings", &self.settings)
            .field("record_factory", &self.record_factory.is_some())
            .field("cloud_store", &self.cloud_store.as_ref().map(|s| s.provider_name()))
            .field("companion_link", &self.companion_link.is_some())
            .field("app_observer", &self.app_observer.is_some())
            .finish()
    }
}
