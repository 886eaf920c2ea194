//! Error types for sightline-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Artifact directory could not be prepared
    #[error("Artifact storage unavailable: {0}")]
    ArtifactRoot(String),
}

/// Errors returned by [`RecordStore`](crate::RecordStore) and
/// [`ArtifactStore`](crate::ArtifactStore) operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("audit record not found: {id}")]
    RecordNotFound { id: String },

    #[error("artifact not found: {digest}")]
    ArtifactNotFound { digest: String },

    #[error("invalid artifact digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("audit record {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("audit record {id} is {status} and can no longer be modified")]
    RecordTerminal { id: String, status: String },

    #[error("performance score {score} for record {id} is outside 0-100")]
    ScoreOutOfRange { id: String, score: u8 },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored audit report is not valid JSON
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Whether the error stems from the backend itself rather than from an
    /// invariant of the record being written.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_) | StorageError::Io(_))
    }
}
