//! Record factories turn backend-native payloads into records.
//!
//! Backends normalise whatever they store (SQL rows, cloud documents,
//! transport dictionaries) into a [`FieldMap`] and hand it to a factory. The
//! replication core never looks inside a payload itself.

use crate::{ENTITY_FIELD, FieldMap, KEY_FIELD, Record, RecordError, RecordKey, Result};

/// Decodes payloads into records and lists every entity name the
/// application needs to round-trip.
pub trait RecordFactory: Send + Sync {
    /// All entity names backends must be able to store and enumerate.
    fn entity_names(&self) -> Vec<String>;

    /// Decodes one payload.
    fn from_payload(&self, payload: &FieldMap) -> Result<Record>;
}

/// A factory for payloads produced by [`Record::to_payload`].
///
/// The entity name is read from the `entity` field. When that field is
/// missing, the key prefix (`"Name:rest"`) is used if it names a known entity,
/// and otherwise the default entity, if one was configured.
#[derive(Debug, Clone, Default)]
pub struct TaggedRecordFactory {
    entity_names: Vec<String>,
    default_entity: Option<String>,
}

impl TaggedRecordFactory {
    /// Creates a factory that accepts the given entity names.
    pub fn new<I, S>(entity_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for name in entity_names {
            let name = name.into();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Self {
            entity_names: names,
            default_entity: None,
        }
    }

    /// Entity assumed for untagged payloads whose key prefix is not known.
    /// The name is added to the known set if missing.
    #[must_use]
    pub fn with_default_entity(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.entity_names.contains(&name) {
            self.entity_names.push(name.clone());
        }
        self.default_entity = Some(name);
        self
    }

    pub fn knows(&self, entity_name: &str) -> bool {
        self.entity_names.iter().any(|n| n == entity_name)
    }

    fn resolve_entity(&self, payload: &FieldMap, key: &RecordKey) -> Result<String> {
        if let Some(value) = payload.get(ENTITY_FIELD) {
            let name = value.as_str().ok_or_else(|| RecordError::InvalidField {
                field: ENTITY_FIELD.to_string(),
                reason: format!("expected text, got {}", value.type_name()),
            })?;
            if self.knows(name) {
                return Ok(name.to_string());
            }
            return Err(RecordError::UnknownEntity(name.to_string()));
        }

        if let Some(prefix) = key.prefix().filter(|p| self.knows(p)) {
            return Ok(prefix.to_string());
        }

        self.default_entity.clone().ok_or_else(|| {
            RecordError::UnknownEntity(key.prefix().unwrap_or(key.as_str()).to_string())
        })
    }
}

impl RecordFactory for TaggedRecordFactory {
    fn entity_names(&self) -> Vec<String> {
        self.entity_names.clone()
    }

    fn from_payload(&self, payload: &FieldMap) -> Result<Record> {
        let key = payload
            .get(KEY_FIELD)
            .and_then(|v| v.as_str())
            .map(RecordKey::from)
            .ok_or(RecordError::MissingKey)?;
        let entity = self.resolve_entity(payload, &key)?;
        Ok(Record::from_parts(entity, key, payload.clone()))
    }
}
