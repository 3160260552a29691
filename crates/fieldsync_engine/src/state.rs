//! Orchestrator state, statistics and cycle results.

use crate::handler::{PullReport, PushReport};
use crate::queue::QueueReport;
use fieldsync_core::{EntityKind, Timestamp};
use serde::Serialize;
use std::time::Duration;

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not syncing.
    Idle,
    /// Running preflight checks.
    Connecting,
    /// Pulling remote changes.
    Pulling,
    /// Delivering the queue and pushing local changes.
    Pushing,
    /// Last cycle completed cleanly.
    Synced,
    /// Last cycle failed or completed partially.
    Error,
    /// Waiting before retrying a cycle.
    RetryWait,
}

impl SyncState {
    /// Returns true if a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Connecting | SyncState::Pulling | SyncState::Pushing
        )
    }

    /// Returns true if a new cycle may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Cumulative statistics across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Cycles that ran to the end, cleanly or partially.
    pub cycles_completed: u64,
    /// Records applied by pulls.
    pub records_pulled: u64,
    /// Rows written by pushes.
    pub records_pushed: u64,
    /// Pulled records deferred for a missing parent.
    pub records_deferred: u64,
    /// Pulled records outside the session's routes.
    pub records_out_of_scope: u64,
    /// Records that failed individually in either direction.
    pub record_failures: u64,
    /// Queued mutations delivered.
    pub mutations_completed: u64,
    /// Queued mutations that ran out of retries.
    pub mutations_exhausted: u64,
    /// Cycle retries after retryable errors.
    pub retries: u64,
    /// When the last cycle finished.
    pub last_sync_time: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of a pull over every registered handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullCycleReport {
    /// Reports of handlers that completed, in pull order.
    pub handlers: Vec<PullReport>,
    /// Handlers that failed without stopping the cycle.
    pub errors: Vec<(EntityKind, String)>,
    /// Wall time of the pull.
    pub duration: Duration,
}

impl PullCycleReport {
    /// Records applied across handlers.
    pub fn applied(&self) -> u64 {
        self.handlers.iter().map(PullReport::total_applied).sum()
    }

    /// Bytes fetched across handlers.
    pub fn bytes_downloaded(&self) -> u64 {
        fn bytes(report: &PullReport) -> u64 {
            report.bytes_downloaded + report.children.iter().map(bytes).sum::<u64>()
        }
        self.handlers.iter().map(bytes).sum()
    }

    /// Returns true if no handler or owned kind failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.handlers.iter().all(|h| h.child_errors.is_empty())
    }

    /// `;`-joined summary of failures.
    pub fn error_summary(&self) -> Option<String> {
        let mut parts: Vec<String> = self
            .errors
            .iter()
            .map(|(kind, err)| format!("{kind}: {err}"))
            .collect();
        parts.extend(self.handlers.iter().flat_map(|h| h.child_errors.iter().cloned()));
        (!parts.is_empty()).then(|| parts.join(";"))
    }
}

/// Outcome of delivering the queue and pushing every registered handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushCycleReport {
    /// Queue pass that ran before the handlers.
    pub queue: QueueReport,
    /// Reports of handlers that completed, in registry order.
    pub handlers: Vec<PushReport>,
    /// Handlers that failed without stopping the cycle.
    pub errors: Vec<(EntityKind, String)>,
    /// Wall time of the push.
    pub duration: Duration,
}

impl PushCycleReport {
    /// Rows written across handlers.
    pub fn pushed(&self) -> u64 {
        self.handlers.iter().map(PushReport::total_pushed).sum()
    }

    /// Returns true if no handler or owned kind failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.handlers.iter().all(|h| h.child_errors.is_empty())
    }
}

/// Result of a bidirectional cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCycleResult {
    /// Records applied by the pull.
    pub pulled: u64,
    /// Rows written by the push.
    pub pushed: u64,
    /// Push half.
    pub push: PushCycleReport,
    /// Pull half.
    pub pull: PullCycleReport,
    /// Whether both halves completed without failures.
    pub success: bool,
    /// Duration of the cycle.
    pub duration: Duration,
}
