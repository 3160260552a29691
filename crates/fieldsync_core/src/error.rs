//! Error types for fieldsync core.

use crate::types::{EntityKind, RecordId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the local stores and snapshot files.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An entity type name did not match any known kind.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// A record was handed to an operation for a different kind.
    #[error("record kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        /// Kind the operation was asked for.
        expected: EntityKind,
        /// Kind the record carries.
        found: EntityKind,
    },

    /// A record could not be found.
    #[error("{kind} record {id} not found")]
    RecordNotFound {
        /// Kind searched.
        kind: EntityKind,
        /// Id searched.
        id: RecordId,
    },

    /// A queued mutation could not be found.
    #[error("queued mutation {id} not found")]
    MutationNotFound {
        /// The missing mutation id.
        id: u64,
    },

    /// Backend-specific storage failure.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a storage error from any message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
