use std::sync::Arc;

use thiserror::Error;

/// Boxed error type used at the store and policy seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration failures raised at construction time or while resolving
/// per-upload file settings.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// Neither a connection string nor a store handle was supplied.
    #[error("Error creating storage engine. At least one of url or db option must be provided.")]
    MissingConnectionSource,
    /// Both a connection string and a store handle were supplied.
    #[error("Error creating storage engine. Only one of url or db option must be provided.")]
    ConflictingConnectionSource,
    /// A connection string was supplied without a driver to open it with.
    #[error("Error creating storage engine. A url option requires a connector.")]
    MissingConnector,
    /// A file policy resolved to a value that is not an object.
    #[error("file settings must be an object, got {kind}")]
    InvalidSettingsType {
        /// JSON type name of the offending value.
        kind: &'static str,
    },
    /// A resolved settings object had a field with an unusable shape.
    #[error("invalid file settings: {0}")]
    InvalidSettings(String),
    /// The user-supplied policy function failed; the message is the
    /// original failure reason, verbatim.
    #[error("{0}")]
    Policy(String),
}

/// Failure to establish the store connection.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConnectionError {
    message: String,
}

impl ConnectionError {
    /// Creates a connection error from a failure reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wraps the rejection reason of a deferred connection source.
    pub fn from_reject(reason: BoxError) -> Self {
        Self::new(reason.to_string())
    }
}

/// A source or destination stream faulted mid-transfer.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The upload source stream produced an error.
    #[error("upload source failed: {0}")]
    Source(String),
    /// The store-side write stream rejected a chunk or its completion.
    #[error("upload write failed: {0}")]
    Write(String),
}

/// An operation against the external chunk store was rejected.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No stored file matched the given identifier.
    #[error("file with id {id} not found in bucket {bucket}")]
    NotFound {
        /// Bucket that was searched.
        bucket: String,
        /// Identifier, in its original representation.
        id: String,
    },
    /// The store rejected the operation for a backend-specific reason.
    #[error("{0}")]
    Backend(String),
}

/// Top-level error surfaced by upload and removal operations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Bad construction input or a failed/ill-typed file policy.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The underlying connection attempt failed. The inner error is shared
    /// with every other observer of the same failed readiness gate.
    #[error("{0}")]
    Connection(Arc<ConnectionError>),
    /// A stream faulted while piping the upload.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// The external store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The file policy flagged this upload as disabled.
    #[error("upload skipped by file settings")]
    Skipped,
}

impl StorageError {
    /// Returns true when the upload was rejected by policy rather than by
    /// an I/O failure.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}
