//! Core type definitions for Tandem.
//!
//! This crate defines the backend-agnostic types shared by every storage
//! backend and by the replication core:
//! - [`Record`] — a typed unit of data identified by its [`RecordKey`]
//! - [`FieldValue`] / [`FieldMap`] — the scalar/blob field model
//! - [`RecordFactory`] — decodes backend-native payloads into records
//! - [`AdapterId`] — identifies one configured backend adapter
//!
//! Record identity is the key alone. Two records with the same key are the
//! same logical entity no matter what their fields contain.

mod factory;
mod ids;
mod record;
mod value;

pub use factory::{RecordFactory, TaggedRecordFactory};
pub use ids::{AdapterId, RecordKey};
pub use record::{ENTITY_FIELD, KEY_FIELD, Record};
pub use value::{FieldMap, FieldValue};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors that can occur while building or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("payload has no text `{KEY_FIELD}` field")]
    MissingKey,

    #[error("unknown entity name: {0}")]
    UnknownEntity(String),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}
