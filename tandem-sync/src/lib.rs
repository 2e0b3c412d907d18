//! Multi-backend record replication for Tandem.
//!
//! Keeps one logical record set consistent across several storage backends:
//! - an on-device SQLite store ([`LocalBackend`])
//! - a remote document store ([`CloudBackend`] over a [`CloudStore`])
//! - a paired companion device ([`CompanionBackend`] over a [`CompanionLink`])
//!
//! # Architecture
//!
//! Each backend sits behind a [`ReplicatedAdapter`], which owns a key-indexed
//! cache of what the backend holds. The adapter decides whether a mutation is
//! new, commits it, and notifies its observers.
//!
//! The [`StorageCoordinator`] is one of those observers. It sends application
//! reads and writes to the preferred adapter and forwards every committed
//! change to all other adapters.
//!
//! ## Replication rules
//!
//! 1. Identity is the record key alone. An add with a known key and a delete
//!    with an unknown key are no-ops.
//! 2. A change from adapter S is forwarded to every adapter except S.
//! 3. Echoes end because of rule 1: when a forwarded change comes back to an
//!    adapter that already holds it, nothing is committed.
//!
//! Records are whole units. There is no field merge and no update path.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tandem_sync::{
//!     BackendKind, BackendOptions, CoordinatorConfig, StorageCoordinator, SyncSettings,
//! };
//! use tandem_types::{Record, TaggedRecordFactory};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tandem_sync::SyncResult<()> {
//! let settings = SyncSettings::new([BackendKind::Local, BackendKind::Remote])
//!     .with_options(BackendOptions::in_memory());
//! let config = CoordinatorConfig::new(settings)
//!     .with_record_factory(Arc::new(TaggedRecordFactory::new(["note"])));
//!
//! let coordinator = StorageCoordinator::new(config).await?;
//! coordinator.add(Record::new("note", "n1").with_field("title", "Hello")).await?;
//!
//! let remote = coordinator.adapter(BackendKind::Remote).unwrap();
//! assert_eq!(remote.enumerate_all().await?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod adapter;
mod backend;
mod cache;
mod change;
pub mod cloud;
pub mod companion;
mod config;
mod coordinator;
mod error;
mod local;
mod observer;
pub mod reconcile;

pub use adapter::{AdapterOptions, BackendAdapter, CommitMode, ReplicatedAdapter};
pub use backend::{BackendKind, RecordBackend};
pub use cache::ReplicationCache;
pub use change::ChangeSet;
pub use config::{BackendOptions, CoordinatorConfig, IN_MEMORY_OPTION, SyncSettings};
pub use coordinator::{CoordinatorSlot, StorageCoordinator, build_adapter};
pub use error::{SyncError, SyncResult};
pub use local::LocalBackend;
pub use observer::{ChangeObserver, ObserverRegistry, SubscriptionId};

pub use cloud::{CloudBackend, CloudStore, CloudStoreConfig, FolderCloudStore, MemoryCloudStore};
pub use companion::{
    ChannelLink, CompanionBackend, CompanionLink, CompanionPayload, NullLink, RetryPolicy,
};
