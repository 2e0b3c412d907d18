//! Change observers and the weak-reference registry adapters keep them in.

use crate::change::ChangeSet;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tandem_types::AdapterId;
use tracing::trace;

/// Receives committed changes from an adapter.
///
/// `source` is the adapter that committed the change.
#[async_trait]
pub trait ChangeObserver: Send + Sync {
    async fn on_change(&self, source: AdapterId, changes: &ChangeSet);
}

/// Handle returned by a registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Entry {
    id: SubscriptionId,
    observer: Weak<dyn ChangeObserver>,
}

/// Registry of observers held by weak reference.
///
/// Registering the same observer (same allocation) twice returns the
/// existing subscription. Observers that have been dropped are pruned on the
/// next registration or notification.
pub struct ObserverRegistry {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, observer: &Arc<dyn ChangeObserver>) -> SubscriptionId {
        let weak = Arc::downgrade(observer);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| e.observer.strong_count() > 0);

        if let Some(existing) = entries.iter().find(|e| Weak::ptr_eq(&e.observer, &weak)) {
            trace!("Observer already registered as {}", existing.id);
            return existing.id;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push(Entry { id, observer: weak });
        id
    }

    /// Removes a subscription. Returns whether it was present.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Number of live observers.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upgrades every live observer. The lock is released before returning
    /// so callers can await on the result.
    pub fn snapshot(&self) -> Vec<Arc<dyn ChangeObserver>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| e.observer.strong_count() > 0);
        entries.iter().filter_map(|e| e.observer.upgrade()).collect()
    }

    /// Delivers `changes` to every live observer, in registration order.
    /// Empty change sets are not delivered.
    pub async fn notify(&self, source: AdapterId, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        for observer in self.snapshot() {
            observer.on_change(source, changes).await;
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("live", &self.len())
            .finish()
    }
}
