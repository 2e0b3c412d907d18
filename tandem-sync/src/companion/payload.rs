//! The context payload exchanged with a companion device.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_types::{FieldMap, KEY_FIELD, Record, RecordFactory};
use tracing::warn;

/// Placeholder timestamp for payloads that arrive without one.
pub const UNKNOWN_TIMESTAMP: &str = "Unknown";

/// Full snapshot of the sender's records.
///
/// Wire form: `{"Objects": [payload, ...], "Timestamp": "<RFC 3339>"}`. A
/// payload without `Objects` carries no snapshot and is ignored, which is
/// different from an empty `Objects` list (the sender holds nothing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionPayload {
    #[serde(rename = "Objects", default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<FieldMap>>,
    #[serde(rename = "Timestamp", default = "unknown_timestamp")]
    pub timestamp: String,
}

fn unknown_timestamp() -> String {
    UNKNOWN_TIMESTAMP.to_string()
}

impl CompanionPayload {
    /// Builds a snapshot payload stamped with the current time.
    pub fn snapshot<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        Self {
            objects: Some(records.into_iter().map(Record::to_payload).collect()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// When the sender built the payload, if the timestamp parses.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Number of records carried, zero when there is no snapshot.
    pub fn len(&self) -> usize {
        self.objects.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the snapshot. Returns `None` when the payload carries no
    /// snapshot. Fails if any entry cannot be decoded, since a partial
    /// snapshot would make reconciliation delete the undecodable records.
    pub fn decode(&self, factory: &dyn RecordFactory) -> SyncResult<Option<Vec<Record>>> {
        let Some(objects) = &self.objects else {
            return Ok(None);
        };
        let mut records = Vec::with_capacity(objects.len());
        for (index, payload) in objects.iter().enumerate() {
            match factory.from_payload(payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let key = payload.get(KEY_FIELD).and_then(|v| v.as_str()).unwrap_or("?");
                    warn!(
                        "Rejecting companion payload from {}: entry {} ({}) does not decode: {}",
                        self.timestamp,
                        index,
                        key,
                        e
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(Some(records))
    }
}
