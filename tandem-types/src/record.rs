use crate::{FieldMap, FieldValue, RecordKey};
use serde::{Deserialize, Serialize};

/// Reserved payload field holding the record key.
pub const KEY_FIELD: &str = "key";

/// Reserved payload field holding the entity name.
pub const ENTITY_FIELD: &str = "entity";

/// A typed unit of replicated data.
///
/// Identity is [`Record::key`] only: equality of keys means "same logical
/// entity" for every novelty and presence check in the replication core.
/// `PartialEq` on the struct compares contents and is meant for tests and
/// diagnostics, not for replication decisions; use [`Record::same_identity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: RecordKey,
    entity_name: String,
    #[serde(default)]
    fields: FieldMap,
}

impl Record {
    /// Creates a record with no fields.
    pub fn new(entity_name: impl Into<String>, key: impl Into<RecordKey>) -> Self {
        Self {
            key: key.into(),
            entity_name: entity_name.into(),
            fields: FieldMap::new(),
        }
    }

    /// Creates a record from an already-decoded field map. Reserved fields
    /// are dropped from `fields`; identity comes from the arguments.
    pub fn from_parts(
        entity_name: impl Into<String>,
        key: impl Into<RecordKey>,
        mut fields: FieldMap,
    ) -> Self {
        fields.remove(KEY_FIELD);
        fields.remove(ENTITY_FIELD);
        Self {
            key: key.into(),
            entity_name: entity_name.into(),
            fields,
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Sets a field. Reserved names (`key`, `entity`) are ignored.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        if name == KEY_FIELD || name == ENTITY_FIELD {
            return;
        }
        self.fields.insert(name, value.into());
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Whether both records denote the same logical entity.
    pub fn same_identity(&self, other: &Record) -> bool {
        self.key == other.key
    }

    /// The payload form: the field map with `key` and `entity` inserted.
    /// This is what backends persist and what [`crate::RecordFactory`]
    /// decodes.
    pub fn to_payload(&self) -> FieldMap {
        let mut payload = self.fields.clone();
        payload.insert(KEY_FIELD.to_string(), FieldValue::Text(self.key.to_string()));
        payload.insert(
            ENTITY_FIELD.to_string(),
            FieldValue::Text(self.entity_name.clone()),
        );
        payload
    }
}
