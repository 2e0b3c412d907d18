//! Per-adapter in-memory record cache.

use crate::change::ChangeSet;
use crate::reconcile;
use std::collections::BTreeMap;
use std::time::Duration;
use tandem_types::{Record, RecordKey};
use tokio::time::Instant;

/// The records an adapter believes its backend holds, keyed by record key.
///
/// A cache starts unpopulated. It becomes populated on the first load and
/// goes back to unpopulated when invalidated or when its time-to-live runs
/// out. Records are kept across invalidation so the next load can report
/// what changed underneath.
#[derive(Debug)]
pub struct ReplicationCache {
    records: BTreeMap<RecordKey, Record>,
    loaded_at: Option<Instant>,
    ttl: Option<Duration>,
}

impl ReplicationCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            records: BTreeMap::new(),
            loaded_at: None,
            ttl,
        }
    }

    /// Whether the cache holds a load that has not been invalidated or
    /// expired.
    pub fn is_populated(&self) -> bool {
        match (self.loaded_at, self.ttl) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(ttl)) => at.elapsed() < ttl,
        }
    }

    /// Replaces the cached records with a fresh load and returns the
    /// difference from what was cached before. Duplicate keys in `loaded`
    /// keep their first occurrence.
    pub fn populate(&mut self, loaded: Vec<Record>) -> ChangeSet {
        let diff = reconcile::plan(self.records.values(), loaded);
        self.apply(&diff);
        self.loaded_at = Some(Instant::now());
        diff
    }

    pub fn invalidate(&mut self) {
        self.loaded_at = None;
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    /// Inserts a record whose key is not yet cached. Returns `false` and
    /// leaves the cache untouched when the key is already present.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.records.contains_key(record.key()) {
            return false;
        }
        self.records.insert(record.key().clone(), record);
        true
    }

    pub fn remove(&mut self, key: &RecordKey) -> Option<Record> {
        self.records.remove(key)
    }

    /// Applies deletes, then adds.
    pub fn apply(&mut self, changes: &ChangeSet) {
        for record in &changes.deletes {
            self.records.remove(record.key());
        }
        for record in &changes.adds {
            self.insert(record.clone());
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Clones out every cached record in key order.
    pub fn records(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<RecordKey> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
