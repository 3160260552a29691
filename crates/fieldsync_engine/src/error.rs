//! Error types for the sync engine.

use fieldsync_core::{CoreError, EntityKind};
use fieldsync_remote::RemoteError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No network; the cycle aborts before touching any metadata.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Tenant or session unusable.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Remote store call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local store call failed.
    #[error("local store error: {0}")]
    Local(#[from] CoreError),

    /// A hard-dependency handler failed and later pulls were skipped.
    #[error("{kind} sync failed, dependent entities skipped: {source}")]
    DependencyFailed {
        /// Handler that failed.
        kind: EntityKind,
        /// Its error.
        source: Box<SyncError>,
    },

    /// A single record could not be mapped or written.
    #[error("{kind} record {id}: {message}")]
    Record {
        /// Entity kind.
        kind: EntityKind,
        /// Document or record id.
        id: String,
        /// What went wrong.
        message: String,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a per-record error.
    pub fn record(kind: EntityKind, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Record {
            kind,
            id: id.into(),
            message: message.into(),
        }
    }

    /// Returns true for loss of connectivity.
    pub fn is_connectivity(&self) -> bool {
        match self {
            SyncError::NotConnected(_) => true,
            SyncError::Remote(e) => e.is_transport(),
            SyncError::DependencyFailed { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }

    /// Returns true for tenant/session failures.
    pub fn is_authorization(&self) -> bool {
        match self {
            SyncError::Unauthorized(_) => true,
            SyncError::Remote(e) => e.is_permission(),
            SyncError::DependencyFailed { source, .. } => source.is_authorization(),
            _ => false,
        }
    }

    /// Returns true if the whole cycle must stop, whichever handler hit it.
    pub fn is_cycle_fatal(&self) -> bool {
        self.is_connectivity() || self.is_authorization() || matches!(self, SyncError::Cancelled)
    }

    /// Returns true if retrying the cycle later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_connectivity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let offline = SyncError::NotConnected("probe".into());
        assert!(offline.is_connectivity());
        assert!(offline.is_retryable());
        assert!(offline.is_cycle_fatal());

        let timeout = SyncError::from(RemoteError::Timeout);
        assert!(timeout.is_retryable());

        let denied = SyncError::from(RemoteError::PermissionDenied("tenant".into()));
        assert!(denied.is_authorization());
        assert!(denied.is_cycle_fatal());
        assert!(!denied.is_retryable());

        assert!(SyncError::Cancelled.is_cycle_fatal());
        assert!(!SyncError::Cancelled.is_retryable());

        let index = SyncError::from(RemoteError::FailedPrecondition("index".into()));
        assert!(!index.is_cycle_fatal());
    }

    #[test]
    fn dependency_failure_keeps_cause() {
        let err = SyncError::DependencyFailed {
            kind: EntityKind::Route,
            source: Box::new(SyncError::from(RemoteError::Unavailable("down".into()))),
        };
        assert!(err.is_connectivity());
        assert!(err.to_string().starts_with("route sync failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn error_display() {
        let err = SyncError::record(EntityKind::Client, "abc", "id is not numeric");
        assert_eq!(err.to_string(), "client record abc: id is not numeric");
    }
}
