#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tandem_sync::{
    AdapterOptions, BackendKind, ChangeObserver, ChangeSet, RecordBackend, ReplicatedAdapter,
    SyncError, SyncResult,
};
use tandem_types::{AdapterId, FieldMap, Record, RecordFactory, RecordKey, TaggedRecordFactory};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Records ──────────────────────────────────────────────────────

pub fn factory() -> Arc<dyn RecordFactory> {
    Arc::new(TaggedRecordFactory::new(["TestObject", "AnotherTestObject"]))
}

pub fn test_object(suffix: &str) -> Record {
    Record::new("TestObject", format!("TestObject:{suffix}"))
}

pub fn another_object(suffix: &str) -> Record {
    Record::new("AnotherTestObject", format!("AnotherTestObject:{suffix}"))
}

pub fn keys(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.key().to_string()).collect()
}

// ── Backend ──────────────────────────────────────────────────────

/// In-memory backend with failure switches and call counters.
pub struct TestBackend {
    kind: BackendKind,
    pub stored: Mutex<BTreeMap<RecordKey, Record>>,
    pub fail_commits: AtomicBool,
    pub fail_loads: AtomicBool,
    pub commit_delay: Mutex<Option<Duration>>,
    pub loads: AtomicUsize,
    pub persists: AtomicUsize,
    pub removes: AtomicUsize,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::of_kind(BackendKind::Local)
    }

    pub fn of_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            stored: Mutex::new(BTreeMap::new()),
            fail_commits: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            commit_delay: Mutex::new(None),
            loads: AtomicUsize::new(0),
            persists: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    pub fn seeded(records: impl IntoIterator<Item = Record>) -> Self {
        let backend = Self::new();
        backend.insert_directly(records);
        backend
    }

    /// Writes records behind the adapter's back.
    pub fn insert_directly(&self, records: impl IntoIterator<Item = Record>) {
        let mut stored = self.stored.lock().unwrap();
        for record in records {
            stored.insert(record.key().clone(), record);
        }
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.stored.lock().unwrap().keys().map(|k| k.to_string()).collect()
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_commit_delay(&self, delay: Duration) {
        *self.commit_delay.lock().unwrap() = Some(delay);
    }

    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn before_commit(&self) -> SyncResult<()> {
        let delay = *self.commit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("injected commit failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordBackend for TestBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn load_all(&self, _entity_names: &[String]) -> SyncResult<Vec<FieldMap>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("injected load failure".into()));
        }
        Ok(self.stored.lock().unwrap().values().map(Record::to_payload).collect())
    }

    async fn persist(&self, record: &Record) -> SyncResult<()> {
        self.before_commit().await?;
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.stored
            .lock()
            .unwrap()
            .insert(record.key().clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, record: &Record) -> SyncResult<()> {
        self.before_commit().await?;
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.stored.lock().unwrap().remove(record.key());
        Ok(())
    }
}

pub fn adapter(backend: TestBackend) -> Arc<ReplicatedAdapter<TestBackend>> {
    Arc::new(ReplicatedAdapter::new(backend, factory()))
}

pub fn adapter_with(backend: TestBackend, options: AdapterOptions) -> Arc<ReplicatedAdapter<TestBackend>> {
    Arc::new(ReplicatedAdapter::with_options(backend, factory(), options))
}

// ── Observers ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<(AdapterId, ChangeSet)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<(AdapterId, ChangeSet)> {
        self.events.lock().unwrap().clone()
    }

    pub fn added_keys(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, c)| keys(&c.adds))
            .collect()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, c)| keys(&c.deletes))
            .collect()
    }
}

#[async_trait]
impl ChangeObserver for RecordingObserver {
    async fn on_change(&self, source: AdapterId, changes: &ChangeSet) {
        self.events.lock().unwrap().push((source, changes.clone()));
    }
}

pub fn as_observer(observer: &Arc<RecordingObserver>) -> Arc<dyn ChangeObserver> {
    observer.clone()
}
