//! Shared types for the storage backends and the failover gateway.

use crate::model::{Message, UploadedFile};
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by a single storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Remote base URL failed to parse or normalize.
    #[error("Invalid remote store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response (network error or timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Remote store responded with a non-success status.
    #[error("Unexpected remote store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the remote store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Embedded database rejected the operation.
    #[error("Local database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A record could not be encoded or decoded.
    #[error("Failed to encode or decode record: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The local connection mutex was poisoned by a panicking holder.
    #[error("Local store lock poisoned")]
    LockPoisoned,
    /// The local database file could not be prepared.
    #[error("Local store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`crate::store::PersistenceGateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Neither backend could service the operation; its outcome is unknown.
    #[error("All storage backends failed during {operation}: {source}")]
    Exhausted {
        /// Gateway operation that failed.
        operation: &'static str,
        /// Error raised by the local backend, the last one attempted.
        #[source]
        source: StorageError,
    },
}

/// Catalog and transcript operations implemented once per backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Return every stored file.
    async fn list_files(&self) -> Result<Vec<UploadedFile>, StorageError>;

    /// Persist a new file record.
    async fn add_file(&self, file: &UploadedFile) -> Result<(), StorageError>;

    /// Remove a file record by identifier.
    async fn delete_file(&self, id: &str) -> Result<(), StorageError>;

    /// Return the transcript in chronological order.
    async fn list_messages(&self) -> Result<Vec<Message>, StorageError>;

    /// Append a message to the transcript.
    async fn add_message(&self, message: &Message) -> Result<(), StorageError>;
}

/// Backend currently servicing gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Remote REST store.
    Remote,
    /// Embedded local store.
    Local,
}

impl BackendKind {
    /// Connectivity label shown to operators.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "cloud",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
