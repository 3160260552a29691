//! Delivery of buffered local mutations.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::handler::{keep_push_stamp, stamp_for_push};
use crate::mapping::record_to_document;
use fieldsync_core::{EntityKind, MutationOperation, MutationStatus, QueuedMutation, RecordId};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of one pass over the mutation queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    /// Mutations attempted.
    pub processed: u64,
    /// Mutations delivered.
    pub completed: u64,
    /// Mutations that failed and stay pending.
    pub retried: u64,
    /// Mutations that failed for the last time.
    pub exhausted: u64,
    /// Mutations held back behind an earlier failure on the same record.
    pub blocked: u64,
    /// Mutations left in flight by an interrupted pass and recovered.
    pub recovered: u64,
}

/// Sends pending mutations to the remote store in enqueue order.
///
/// Once a mutation of a record fails, later mutations of the same record
/// wait for the next pass so they are never applied out of order. Loss of
/// connectivity stops the pass without consuming a retry.
pub async fn process_queue(ctx: &SyncContext) -> SyncResult<QueueReport> {
    let mut report = QueueReport {
        recovered: ctx.queue.recover_processing()? as u64,
        ..QueueReport::default()
    };
    let pending = ctx.queue.next_pending(usize::MAX)?;
    let mut blocked: HashSet<(EntityKind, RecordId)> = HashSet::new();

    for batch in pending.chunks(ctx.config.queue_batch_size.max(1)) {
        ctx.check_cancelled()?;
        for mutation in batch {
            let key = (mutation.entity_type, mutation.entity_id);
            if blocked.contains(&key) {
                report.blocked += 1;
                continue;
            }
            let mut mutation = mutation.clone();
            mutation.mark_processing();
            ctx.queue.update(&mutation)?;
            report.processed += 1;

            match deliver(ctx, &mutation).await {
                Ok(()) => {
                    mutation.mark_completed();
                    ctx.queue.update(&mutation)?;
                    report.completed += 1;
                }
                Err(err) if err.is_cycle_fatal() => {
                    mutation.status = MutationStatus::Pending;
                    ctx.queue.update(&mutation)?;
                    return Err(err);
                }
                Err(err) => {
                    blocked.insert(key);
                    match mutation.record_failure(err.to_string()) {
                        MutationStatus::Failed => {
                            tracing::warn!(
                                mutation = %mutation.id,
                                entity = %mutation.entity_type,
                                id = %mutation.entity_id,
                                error = %err,
                                "retry exhausted, mutation failed"
                            );
                            report.exhausted += 1;
                        }
                        _ => {
                            tracing::debug!(mutation = %mutation.id, retry = mutation.retry_count, error = %err, "mutation will be retried");
                            report.retried += 1;
                        }
                    }
                    ctx.queue.update(&mutation)?;
                }
            }
        }
    }

    if report.processed > 0 {
        tracing::info!(
            completed = report.completed,
            retried = report.retried,
            exhausted = report.exhausted,
            "mutation queue processed"
        );
    }
    Ok(report)
}

async fn deliver(ctx: &SyncContext, mutation: &QueuedMutation) -> SyncResult<()> {
    let collection = ctx.collection(mutation.entity_type)?;
    match mutation.operation {
        MutationOperation::Create | MutationOperation::Update => {
            let record = mutation.decode_payload()?;
            if record.id != mutation.entity_id {
                return Err(SyncError::record(
                    mutation.entity_type,
                    mutation.entity_id.to_string(),
                    format!("payload carries id {}", record.id),
                ));
            }
            let stamped = stamp_for_push(&record, ctx.now());
            ctx.remote.set_document(&collection, record_to_document(&stamped)).await?;
            keep_push_stamp(ctx.local.as_ref(), &record, stamped)?;
        }
        MutationOperation::Delete => {
            let existed = ctx
                .remote
                .delete_document(&collection, &mutation.entity_id.to_string())
                .await?;
            if !existed {
                tracing::debug!(mutation = %mutation.id, "document already absent");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::context::StaticSession;
    use fieldsync_core::{
        LocalStore, MemoryLocalStore, MemoryMetadataStore, MemoryMutationQueue, MutationQueue,
        NewMutation, Record, Timestamp,
    };
    use fieldsync_remote::{collection_reference, MemoryRemoteStore, RemoteError, TenantId};
    use std::sync::Arc;

    fn setup() -> (SyncContext, Arc<MemoryRemoteStore>, Arc<MemoryMutationQueue>) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let queue = Arc::new(MemoryMutationQueue::new());
        let ctx = SyncContext::new(
            Arc::new(MemoryLocalStore::new()),
            remote.clone(),
            Arc::new(MemoryMetadataStore::new()),
            queue.clone(),
            Arc::new(StaticSession::new("acme", "1")),
        )
        .with_config(SyncConfig::new().with_queue_batch_size(2));
        (ctx, remote, queue)
    }

    fn vehicle(id: i64, plate: &str) -> Record {
        Record::new(EntityKind::Vehicle, RecordId::new(id), Timestamp::from_millis(1)).with_field("plate", plate)
    }

    fn enqueue(queue: &MemoryMutationQueue, op: MutationOperation, record: &Record, max: u32) {
        queue
            .enqueue(NewMutation::upsert(op, record, Timestamp::from_millis(1), max).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (ctx, remote, queue) = setup();
        enqueue(&queue, MutationOperation::Create, &vehicle(1, "A"), 3);
        enqueue(&queue, MutationOperation::Update, &vehicle(1, "B"), 3);
        enqueue(&queue, MutationOperation::Create, &vehicle(2, "C"), 3);

        let report = process_queue(&ctx).await.unwrap();
        assert_eq!(report.completed, 3);
        assert!(queue.health().unwrap().is_clean());

        let path = collection_reference(&TenantId::new("acme").unwrap(), "vehicles").unwrap();
        let docs = remote.documents(&path);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get("plate").unwrap(), "B");
    }

    #[tokio::test]
    async fn failure_blocks_later_writes_of_same_record() {
        let (ctx, remote, queue) = setup();
        remote.fail_writes("vehicles", "1", RemoteError::InvalidArgument("rejected".into()));
        enqueue(&queue, MutationOperation::Create, &vehicle(1, "A"), 3);
        enqueue(&queue, MutationOperation::Update, &vehicle(1, "B"), 3);
        enqueue(&queue, MutationOperation::Create, &vehicle(2, "C"), 3);

        let report = process_queue(&ctx).await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.completed, 1);
        let health = queue.health().unwrap();
        assert_eq!(health.pending, 2);
    }

    #[tokio::test]
    async fn exhausted_mutation_is_failed_and_not_retried() {
        let (ctx, remote, queue) = setup();
        remote.fail_writes("vehicles", "1", RemoteError::InvalidArgument("rejected".into()));
        enqueue(&queue, MutationOperation::Create, &vehicle(1, "A"), 1);

        process_queue(&ctx).await.unwrap();
        let second = process_queue(&ctx).await.unwrap();
        assert_eq!(second.exhausted, 1);
        assert_eq!(queue.health().unwrap().failed, 1);

        let third = process_queue(&ctx).await.unwrap();
        assert_eq!(third.processed, 0);
        let listed = queue.list().unwrap();
        assert_eq!(listed[0].status, MutationStatus::Failed);
        assert_eq!(listed[0].retry_count, 2);
    }

    #[tokio::test]
    async fn offline_stops_without_consuming_retries() {
        let (ctx, remote, queue) = setup();
        enqueue(&queue, MutationOperation::Create, &vehicle(1, "A"), 0);
        remote.set_online(false);

        let err = process_queue(&ctx).await.unwrap_err();
        assert!(err.is_connectivity());
        let listed = queue.list().unwrap();
        assert_eq!(listed[0].status, MutationStatus::Pending);
        assert_eq!(listed[0].retry_count, 0);
    }

    #[tokio::test]
    async fn delivered_upsert_carries_delivery_time() {
        let (ctx, remote, queue) = setup();
        let record = vehicle(1, "A");
        ctx.local.upsert(record.clone()).unwrap();
        enqueue(&queue, MutationOperation::Update, &record, 3);

        process_queue(&ctx).await.unwrap();
        let stored = ctx.local.get(EntityKind::Vehicle, RecordId::new(1)).unwrap().unwrap();
        assert!(stored.last_modified > record.last_modified);
        let path = collection_reference(&TenantId::new("acme").unwrap(), "vehicles").unwrap();
        let docs = remote.documents(&path);
        assert_eq!(docs[0].get("last_modified").unwrap(), stored.last_modified.as_millis());
    }

    #[tokio::test]
    async fn delete_of_absent_document_completes() {
        let (ctx, _remote, queue) = setup();
        queue
            .enqueue(NewMutation::delete(EntityKind::Vehicle, RecordId::new(9), Timestamp::from_millis(1), 3))
            .unwrap();
        let report = process_queue(&ctx).await.unwrap();
        assert_eq!(report.completed, 1);
    }
}
