//! SQLite storage layer for Tandem.
//!
//! Provides the persistent store behind the local backend. Records are kept
//! as JSON payloads (the record's field map with `key` and `entity` inserted)
//! grouped by entity name, one row per key.
//!
//! All calls are blocking. Async callers run them on
//! `tokio::task::spawn_blocking`.

mod error;
mod record_store;

pub use error::{StorageError, StorageResult};
pub use record_store::RecordStore;

/// Default file name for an on-disk record store.
pub const DEFAULT_DB_FILE: &str = "tandem.sqlite";
