//! Offline write buffer.
//!
//! A mutation moves `Pending -> Processing -> Completed`, or back to `Pending`
//! after a failed attempt, and ends `Failed` once its retry count exceeds
//! `max_retries`. Completed mutations may be purged.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::types::{EntityKind, RecordId, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a queued mutation, assigned in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mut:{}", self.0)
    }
}

/// Kind of local write that was buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationOperation {
    /// Record created offline.
    Create,
    /// Record updated offline.
    Update,
    /// Record deleted offline.
    Delete,
}

/// Lifecycle state of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationStatus {
    /// Waiting to be sent.
    Pending,
    /// Being sent by the current queue pass.
    Processing,
    /// Sent successfully.
    Completed,
    /// Retries exhausted; not retried automatically.
    Failed,
}

impl MutationStatus {
    /// Returns true for states the queue processor never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationStatus::Completed | MutationStatus::Failed)
    }
}

/// A mutation about to be enqueued.
#[derive(Debug, Clone)]
pub struct NewMutation {
    /// Write kind.
    pub operation: MutationOperation,
    /// Entity kind written.
    pub entity_type: EntityKind,
    /// Id of the written record.
    pub entity_id: RecordId,
    /// Serialized record (empty for deletes).
    pub payload: String,
    /// When the local write happened.
    pub timestamp: Timestamp,
    /// Attempts allowed beyond the first.
    pub max_retries: u32,
}

impl NewMutation {
    /// Buffers a create or update of `record`.
    pub fn upsert(
        operation: MutationOperation,
        record: &Record,
        timestamp: Timestamp,
        max_retries: u32,
    ) -> CoreResult<Self> {
        Ok(Self {
            operation,
            entity_type: record.kind,
            entity_id: record.id,
            payload: serde_json::to_string(record)?,
            timestamp,
            max_retries,
        })
    }

    /// Buffers a delete.
    pub fn delete(kind: EntityKind, id: RecordId, timestamp: Timestamp, max_retries: u32) -> Self {
        Self {
            operation: MutationOperation::Delete,
            entity_type: kind,
            entity_id: id,
            payload: String::new(),
            timestamp,
            max_retries,
        }
    }
}

/// A buffered local write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Queue-assigned id.
    pub id: MutationId,
    /// Write kind.
    pub operation: MutationOperation,
    /// Entity kind written.
    pub entity_type: EntityKind,
    /// Id of the written record.
    pub entity_id: RecordId,
    /// Serialized record.
    pub payload: String,
    /// When the local write happened.
    pub timestamp: Timestamp,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempts allowed beyond the first.
    pub max_retries: u32,
    /// Lifecycle state.
    pub status: MutationStatus,
    /// Message of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedMutation {
    /// Marks the mutation as being sent.
    pub fn mark_processing(&mut self) {
        self.status = MutationStatus::Processing;
    }

    /// Marks the mutation as sent.
    pub fn mark_completed(&mut self) {
        self.status = MutationStatus::Completed;
        self.last_error = None;
    }

    /// Records a failed attempt and returns the resulting status.
    pub fn record_failure(&mut self, error: impl Into<String>) -> MutationStatus {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.status = if self.retry_count > self.max_retries {
            MutationStatus::Failed
        } else {
            MutationStatus::Pending
        };
        self.status
    }

    /// Decodes the payload as a record.
    pub fn decode_payload(&self) -> CoreResult<Record> {
        let record: Record = serde_json::from_str(&self.payload)?;
        if record.kind != self.entity_type {
            return Err(CoreError::KindMismatch {
                expected: self.entity_type,
                found: record.kind,
            });
        }
        Ok(record)
    }
}

/// Counts of queued mutations by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueHealth {
    /// Waiting to be sent.
    pub pending: usize,
    /// Left in flight.
    pub processing: usize,
    /// Sent and not yet purged.
    pub completed: usize,
    /// Retries exhausted.
    pub failed: usize,
}

impl QueueHealth {
    /// Returns true when nothing is waiting or failed.
    pub fn is_clean(&self) -> bool {
        self.pending == 0 && self.processing == 0 && self.failed == 0
    }
}

/// Storage for the offline write buffer.
pub trait MutationQueue: Send + Sync {
    /// Appends a mutation in `Pending` state.
    fn enqueue(&self, mutation: NewMutation) -> CoreResult<QueuedMutation>;

    /// Oldest pending mutations, in enqueue order.
    fn next_pending(&self, limit: usize) -> CoreResult<Vec<QueuedMutation>>;

    /// Persists a mutation's new state.
    fn update(&self, mutation: &QueuedMutation) -> CoreResult<()>;

    /// Returns mutations left `Processing` by an interrupted pass to `Pending`.
    fn recover_processing(&self) -> CoreResult<usize>;

    /// Counts by status.
    fn health(&self) -> CoreResult<QueueHealth>;

    /// Deletes completed mutations, returning how many were removed.
    fn purge_completed(&self) -> CoreResult<usize>;

    /// All mutations, in enqueue order.
    fn list(&self) -> CoreResult<Vec<QueuedMutation>>;
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    entries: BTreeMap<MutationId, QueuedMutation>,
}

/// In-memory mutation queue.
#[derive(Debug, Default)]
pub struct MemoryMutationQueue {
    state: Mutex<QueueState>,
}

impl MemoryMutationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue holding existing mutations.
    pub fn with_mutations(mutations: impl IntoIterator<Item = QueuedMutation>) -> Self {
        let mut state = QueueState::default();
        for mutation in mutations {
            state.next_id = state.next_id.max(mutation.id.0 + 1);
            state.entries.insert(mutation.id, mutation);
        }
        Self {
            state: Mutex::new(state),
        }
    }
}

impl MutationQueue for MemoryMutationQueue {
    fn enqueue(&self, mutation: NewMutation) -> CoreResult<QueuedMutation> {
        let mut state = self.state.lock();
        let id = MutationId(state.next_id);
        state.next_id += 1;
        let queued = QueuedMutation {
            id,
            operation: mutation.operation,
            entity_type: mutation.entity_type,
            entity_id: mutation.entity_id,
            payload: mutation.payload,
            timestamp: mutation.timestamp,
            retry_count: 0,
            max_retries: mutation.max_retries,
            status: MutationStatus::Pending,
            last_error: None,
        };
        state.entries.insert(id, queued.clone());
        Ok(queued)
    }

    fn next_pending(&self, limit: usize) -> CoreResult<Vec<QueuedMutation>> {
        Ok(self
            .state
            .lock()
            .entries
            .values()
            .filter(|m| m.status == MutationStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update(&self, mutation: &QueuedMutation) -> CoreResult<()> {
        let mut state = self.state.lock();
        let slot = state
            .entries
            .get_mut(&mutation.id)
            .ok_or(CoreError::MutationNotFound { id: mutation.id.0 })?;
        *slot = mutation.clone();
        Ok(())
    }

    fn recover_processing(&self) -> CoreResult<usize> {
        let mut state = self.state.lock();
        let mut recovered = 0;
        for mutation in state.entries.values_mut() {
            if mutation.status == MutationStatus::Processing {
                mutation.status = MutationStatus::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn health(&self) -> CoreResult<QueueHealth> {
        let state = self.state.lock();
        let mut health = QueueHealth::default();
        for mutation in state.entries.values() {
            match mutation.status {
                MutationStatus::Pending => health.pending += 1,
                MutationStatus::Processing => health.processing += 1,
                MutationStatus::Completed => health.completed += 1,
                MutationStatus::Failed => health.failed += 1,
            }
        }
        Ok(health)
    }

    fn purge_completed(&self) -> CoreResult<usize> {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, m| m.status != MutationStatus::Completed);
        Ok(before - state.entries.len())
    }

    fn list(&self) -> CoreResult<Vec<QueuedMutation>> {
        Ok(self.state.lock().entries.values().cloned().collect())
    }
}
