//! Watermark bookkeeping on top of the metadata store.

use crate::context::SyncContext;
use crate::error::SyncResult;
use fieldsync_core::{EntityKind, SyncMetadata, SyncScope, Timestamp};

/// Figures recorded after a cycle of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    /// Records applied or sent.
    pub count: u64,
    /// Cycle duration.
    pub duration_ms: u64,
    /// Bytes read.
    pub bytes_downloaded: u64,
    /// Bytes written.
    pub bytes_uploaded: u64,
    /// Error summary for a partial cycle.
    pub error: Option<String>,
    /// Watermark to record; defaults to the clock.
    pub timestamp: Option<Timestamp>,
}

/// Last successful watermark of a scope, `None` if it never completed.
pub fn last_sync_timestamp(ctx: &SyncContext, scope: SyncScope) -> SyncResult<Option<Timestamp>> {
    let user = ctx.user()?;
    Ok(ctx
        .metadata
        .get(&scope.key(), &user)?
        .map(|row| row.last_sync_timestamp)
        .filter(|ts| !ts.is_zero()))
}

/// Records a completed (or partially completed) cycle.
///
/// The stored watermark never moves backwards.
pub fn save_sync_metadata(
    ctx: &SyncContext,
    scope: SyncScope,
    update: MetadataUpdate,
) -> SyncResult<SyncMetadata> {
    let user = ctx.user()?;
    let now = ctx.now();
    let previous = ctx.metadata.get(&scope.key(), &user)?;
    let previous_ts = previous
        .as_ref()
        .map_or(Timestamp::ZERO, |row| row.last_sync_timestamp);
    let requested = update.timestamp.unwrap_or(now);
    if requested < previous_ts {
        tracing::debug!(%scope, %requested, %previous_ts, "watermark kept at previous value");
    }

    let row = SyncMetadata {
        entity_type: scope.key(),
        user_id: user,
        last_sync_timestamp: requested.max(previous_ts),
        last_sync_count: update.count,
        last_sync_duration_ms: update.duration_ms,
        bytes_downloaded: update.bytes_downloaded,
        bytes_uploaded: update.bytes_uploaded,
        last_error: update.error,
        updated_at: now,
    };
    ctx.metadata.put(row.clone())?;
    Ok(row)
}

/// Notes a failed cycle without moving the watermark.
pub fn record_sync_error(ctx: &SyncContext, scope: SyncScope, error: &str) -> SyncResult<()> {
    let user = ctx.user()?;
    let mut row = ctx
        .metadata
        .get(&scope.key(), &user)?
        .unwrap_or_else(|| SyncMetadata::empty(scope, user));
    row.last_error = Some(error.to_string());
    row.updated_at = ctx.now();
    ctx.metadata.put(row)?;
    Ok(())
}

/// Forgets both watermarks of a kind.
pub fn reset_sync_metadata(ctx: &SyncContext, kind: EntityKind) -> SyncResult<()> {
    let user = ctx.user()?;
    ctx.metadata.remove(&SyncScope::Pull(kind).key(), &user)?;
    ctx.metadata.remove(&SyncScope::Push(kind).key(), &user)?;
    Ok(())
}
