//! Error types for the sync layer.

use crate::backend::BackendKind;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A coordinator is already configured in this slot.
    #[error("storage coordinator already initialized")]
    AlreadyInitialized,

    /// Backends were requested without a record factory to decode them.
    #[error("backends configured without a record factory")]
    MissingObjectFactory,

    /// No preferred backend could be determined from the configuration.
    #[error("no preferred backend could be determined")]
    MissingPreferredBackend,

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A backend failed to commit an add or delete.
    #[error("{backend} backend commit failed: {reason}")]
    BackendCommit { backend: BackendKind, reason: String },

    /// A backend could not be enumerated. Adapters log this and carry on
    /// with an empty cache.
    #[error("{backend} backend population failed: {reason}")]
    BackendPopulation { backend: BackendKind, reason: String },

    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] tandem_storage::StorageError),

    /// Record decoding error.
    #[error("record error: {0}")]
    Record(#[from] tandem_types::RecordError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote store or companion transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Whether this is a configuration error (fatal to a `configure` call).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInitialized
                | Self::MissingObjectFactory
                | Self::MissingPreferredBackend
                | Self::InvalidConfig(_)
        )
    }
}
