//! Error types for resync.
//!
//! Each layer has its own error enum; `ResyncError` aggregates them for
//! callers that drive the whole engine (the CLI, the dispatcher).

use thiserror::Error;

use crate::features::queue::OperationStatus;

/// Errors raised by a durable queue store or the key-value store.
///
/// Storage failures are never swallowed: losing a write would lose user
/// intent, so every call surfaces them to its caller.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The `SQLite` backend reported a failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A payload or record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row could not be decoded into a record.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Key of the offending record.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Schema migration failed.
    #[error("migration to v{version} failed: {reason}")]
    Migration {
        /// Target schema version.
        version: i32,
        /// Underlying failure.
        reason: String,
    },
}

/// Errors returned by an online executor.
///
/// Only `Network` and `Timeout` are transient: the dispatcher defers those
/// to the queue instead of surfacing them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The backend did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The backend (or the executor itself) rejected the operation.
    #[error("{0}")]
    Application(String),
}

/// Errors raised by the quick-action server channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// No completion arrived for the correlation id within the timeout.
    #[error("server action '{action}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the server action.
        action: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Nobody is listening for outbound requests anymore.
    #[error("server channel disconnected")]
    Disconnected,

    /// The server answered with an error.
    #[error("server action '{action}' failed: {message}")]
    Rejected {
        /// Name of the server action.
        action: String,
        /// Error reported by the server.
        message: String,
    },
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum ResyncError {
    /// Durable storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An online executor failed with a non-transient error.
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// A quick-action server call failed.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Configuration could not be loaded, saved or understood.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced record or action does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The item is currently being synchronized.
    #[error("operation {0} is being synchronized")]
    Busy(String),

    /// A status change that the lifecycle does not allow.
    #[error("illegal transition {from} -> {to} for operation {id}")]
    InvalidTransition {
        /// Operation id.
        id: String,
        /// Current status.
        from: OperationStatus,
        /// Requested status.
        to: OperationStatus,
    },

    /// JSON encoding of command output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for ResyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}
