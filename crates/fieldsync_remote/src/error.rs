//! Error types for remote store access.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a [`RemoteStore`](crate::RemoteStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store could not be reached.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// A call did not complete in time.
    #[error("remote call timed out")]
    Timeout,

    /// The session may not access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The query needs something the store does not have (e.g. an index).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The request was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A tenant id failed validation.
    #[error("invalid tenant id: {0:?}")]
    InvalidTenant(String),

    /// A collection path failed validation.
    #[error("invalid collection path: {0:?}")]
    InvalidPath(String),

    /// Unexpected server-side failure.
    #[error("internal remote error: {0}")]
    Internal(String),
}

impl RemoteError {
    /// Returns true for failures of the connection rather than of the request.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout)
    }

    /// Returns true for access-control failures.
    pub fn is_permission(&self) -> bool {
        matches!(self, RemoteError::PermissionDenied(_))
    }
}
