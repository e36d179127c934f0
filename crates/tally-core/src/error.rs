//! Error types for tally.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using tally's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Mirror operation that was in flight when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOp {
    Append,
    Update,
    Delete,
}

impl fmt::Display for MirrorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MirrorOp::Append => "append",
            MirrorOp::Update => "update",
            MirrorOp::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Core error type for tally operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction not found (or not owned by the caller)
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Spreadsheet mirror call failed
    #[error("Mirror error: {0}")]
    Mirror(String),

    /// The primary store committed but the mirror call failed afterwards.
    ///
    /// Callers must treat the primary mutation as applied and the mirror
    /// state as unknown.
    #[error("Mirror out of sync after {op} of transaction {transaction_id}: {message}")]
    MirrorDesync {
        op: MirrorOp,
        transaction_id: Uuid,
        message: String,
    },

    /// Blob storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a mirror failure that happened after the primary store committed.
    pub fn desync(op: MirrorOp, transaction_id: Uuid, cause: Error) -> Self {
        let message = match cause {
            Error::Mirror(msg) => msg,
            other => other.to_string(),
        };
        Error::MirrorDesync {
            op,
            transaction_id,
            message,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
