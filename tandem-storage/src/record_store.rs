//! Persistent record storage backed by SQLite.

use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tandem_types::{FieldMap, Record, RecordKey};
use tracing::{debug, info, warn};

/// SQLite-backed store of record payloads.
///
/// Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// Opens (or creates) a record store at the given path. Missing parent
    /// directories are created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Record store journal mode: {}", mode);
        info!("Opened record store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory record store (for tests and ephemeral setups).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                entity TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (entity, key)
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Inserts or replaces the record's payload.
    pub fn save(&self, record: &Record) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.to_payload())?;
        let now = chrono::Utc::now().timestamp_millis();
        self.conn()?.execute(
            "INSERT OR REPLACE INTO records (entity, key, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![record.entity_name(), record.key().as_str(), payload, now],
        )?;
        debug!("Saved {} {}", record.entity_name(), record.key());
        Ok(())
    }

    /// Deletes a record. Returns whether a row was removed.
    pub fn delete(&self, entity: &str, key: &RecordKey) -> StorageResult<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM records WHERE entity = ?1 AND key = ?2",
            params![entity, key.as_str()],
        )?;
        debug!("Deleted {} {} ({} rows)", entity, key, removed);
        Ok(removed > 0)
    }

    /// Loads the payload of a single record, if stored.
    pub fn get(&self, entity: &str, key: &RecordKey) -> StorageResult<Option<FieldMap>> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM records WHERE entity = ?1 AND key = ?2",
                params![entity, key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StorageError::from))
            .transpose()
    }

    /// Loads every payload stored for an entity, ordered by key. Rows whose
    /// payload does not parse are skipped.
    pub fn load_entity(&self, entity: &str) -> StorageResult<Vec<FieldMap>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT key, payload FROM records WHERE entity = ?1 ORDER BY key")?;
        let raw = stmt
            .query_map(params![entity], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let payloads = raw
            .iter()
            .filter_map(|(key, payload)| match serde_json::from_str(payload) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Skipping unreadable {} row {}: {}", entity, key, e);
                    None
                }
            })
            .collect();
        Ok(payloads)
    }

    /// Distinct entity names with at least one stored record.
    pub fn entity_names(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT entity FROM records ORDER BY entity")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Total number of stored records.
    pub fn count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| StorageError::InvalidData(format!("row count {count}")))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}
