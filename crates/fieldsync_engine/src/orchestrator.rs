//! Sequencing of handlers into sync cycles.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::handler::{EntityHandler, PullOptions, SyncHandler};
use crate::metadata::{self, last_sync_timestamp, record_sync_error, MetadataUpdate};
use crate::queue::{process_queue, QueueReport};
use crate::state::{PullCycleReport, PushCycleReport, SyncCycleResult, SyncState, SyncStats};
use fieldsync_core::{
    EntityKind, MutationOperation, NewMutation, QueueHealth, QueuedMutation, Record, RecordId,
    SyncMetadata, SyncScope, Timestamp,
};
use fieldsync_remote::CollectionPath;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Order in which the standard registry pulls top-level kinds.
///
/// Identity and access first, then grouping and business entities, then
/// records that reference them. Owned kinds (settlement lines, contract
/// amendments, expense types, signature audit logs and the stock movements
/// of cloths) are pulled by their owners.
pub const PULL_ORDER: [EntityKind; 16] = [
    EntityKind::Employee,
    EntityKind::EmployeeRoute,
    EntityKind::Route,
    EntityKind::Client,
    EntityKind::Table,
    EntityKind::Cycle,
    EntityKind::Settlement,
    EntityKind::ExpenseCategory,
    EntityKind::Expense,
    EntityKind::Contract,
    EntityKind::Goal,
    EntityKind::EmployeeGoal,
    EntityKind::Signature,
    EntityKind::Vehicle,
    EntityKind::Equipment,
    EntityKind::Cloth,
];

/// Handlers in the order cycles run them.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn SyncHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`EntityHandler`] per kind of [`PULL_ORDER`].
    pub fn standard() -> Self {
        PULL_ORDER
            .into_iter()
            .fold(Self::new(), |registry, kind| registry.register(Arc::new(EntityHandler::new(kind))))
    }

    /// Appends a handler.
    #[must_use]
    pub fn register(mut self, handler: Arc<dyn SyncHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Handlers in order.
    pub fn handlers(&self) -> &[Arc<dyn SyncHandler>] {
        &self.handlers
    }

    /// Kinds in order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.handlers.iter().map(|h| h.kind()).collect()
    }

    /// Handler of a kind.
    pub fn get(&self, kind: EntityKind) -> Option<&Arc<dyn SyncHandler>> {
        self.handlers.iter().find(|h| h.kind() == kind)
    }
}

/// Runs pull, push and bidirectional cycles over a handler registry.
pub struct SyncOrchestrator {
    ctx: SyncContext,
    registry: HandlerRegistry,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator.
    pub fn new(ctx: SyncContext, registry: HandlerRegistry) -> SyncResult<Self> {
        ctx.config.validate()?;
        Ok(Self {
            ctx,
            registry,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Creates an orchestrator over [`HandlerRegistry::standard`].
    pub fn with_standard_handlers(ctx: SyncContext) -> SyncResult<Self> {
        Self::new(ctx, HandlerRegistry::standard())
    }

    /// Shared context.
    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Registered handlers.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels the running cycle at the next handler or page boundary.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Claims the orchestrator for a cycle: the state check and the move to
    /// `Connecting` happen under one write lock.
    fn begin(&self, cycle: &str) -> SyncResult<()> {
        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *state),
                    to: cycle.into(),
                });
            }
            *state = SyncState::Connecting;
        }
        self.ctx.reset_cancel();
        Ok(())
    }

    fn preflight(&self) -> SyncResult<()> {
        self.ctx.ensure_online()?;
        self.ctx.tenant()?;
        self.ctx.user()?;
        Ok(())
    }

    fn fail(&self, error: SyncError) -> SyncError {
        tracing::error!(error = %error, "sync cycle aborted");
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
        error
    }

    fn finish(&self, success: bool, summary: Option<String>) {
        self.set_state(if success { SyncState::Synced } else { SyncState::Error });
        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.last_sync_time = Some(self.ctx.now());
        stats.last_error = summary;
    }

    fn count_pull(&self, report: &PullCycleReport) {
        let mut stats = self.stats.write();
        for handler in &report.handlers {
            stats.records_pulled += handler.total_applied();
            stats.records_deferred += handler.total_deferred();
            stats.records_out_of_scope += handler.total_out_of_scope();
            stats.record_failures += handler.total_failed();
        }
    }

    fn count_push(&self, report: &PushCycleReport) {
        let mut stats = self.stats.write();
        stats.records_pushed += report.pushed();
        stats.record_failures += report.handlers.iter().map(|h| h.total_failed()).sum::<u64>();
        stats.mutations_completed += report.queue.completed;
        stats.mutations_exhausted += report.queue.exhausted;
    }

    /// Pulls every registered kind.
    pub async fn sync_pull(&self) -> SyncResult<PullCycleReport> {
        self.sync_pull_with(PullOptions::default()).await
    }

    /// Pulls every registered kind with explicit options.
    pub async fn sync_pull_with(&self, options: PullOptions) -> SyncResult<PullCycleReport> {
        self.begin("pull")?;
        let outcome = match self.preflight() {
            Ok(()) => {
                self.set_state(SyncState::Pulling);
                self.run_pull(options).await
            }
            Err(err) => Err(err),
        };
        match outcome {
            Ok(report) => {
                self.count_pull(&report);
                self.finish(report.is_success(), report.error_summary());
                Ok(report)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Delivers the mutation queue, then pushes every registered kind.
    pub async fn sync_push(&self) -> SyncResult<PushCycleReport> {
        self.begin("push")?;
        let outcome = match self.preflight() {
            Ok(()) => {
                self.set_state(SyncState::Pushing);
                self.run_push().await
            }
            Err(err) => Err(err),
        };
        match outcome {
            Ok(report) => {
                self.count_push(&report);
                self.finish(report.is_success(), summarize_errors(&report.errors));
                Ok(report)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Pushes, then pulls with the clock reading taken before the push as
    /// watermark.
    pub async fn sync_all(&self) -> SyncResult<SyncCycleResult> {
        let started = Instant::now();
        self.begin("sync")?;
        if let Err(err) = self.preflight() {
            return Err(self.fail(err));
        }
        let watermark = self.ctx.now();

        self.set_state(SyncState::Pushing);
        let push = match self.run_push().await {
            Ok(push) => push,
            Err(err) => return Err(self.fail(err)),
        };
        self.count_push(&push);

        if let Err(err) = self.ctx.check_cancelled() {
            return Err(self.fail(err));
        }
        self.set_state(SyncState::Pulling);
        let pull = match self.run_pull(PullOptions::with_watermark(watermark)).await {
            Ok(pull) => pull,
            Err(err) => return Err(self.fail(err)),
        };
        self.count_pull(&pull);

        let success = push.is_success() && pull.is_success();
        let summary = [summarize_errors(&push.errors), pull.error_summary()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        self.finish(success, (!summary.is_empty()).then(|| summary.join(";")));

        let result = SyncCycleResult {
            pulled: pull.applied(),
            pushed: push.pushed(),
            push,
            pull,
            success,
            duration: started.elapsed(),
        };
        tracing::info!(
            pulled = result.pulled,
            pushed = result.pushed,
            success = result.success,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "sync cycle finished"
        );
        Ok(result)
    }

    /// Runs [`sync_all`](Self::sync_all), retrying retryable failures with backoff.
    pub async fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry = self.ctx.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying sync cycle");
                tokio::time::sleep(delay).await;
                self.stats.write().retries += 1;
                self.set_state(SyncState::Idle);
            }

            self.ctx.check_cancelled()?;

            match self.sync_all().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Config("no sync attempts made".into())))
    }

    async fn run_pull(&self, options: PullOptions) -> SyncResult<PullCycleReport> {
        let started = Instant::now();
        let start = self.ctx.now();
        let mut report = PullCycleReport::default();

        for handler in self.registry.handlers() {
            self.ctx.check_cancelled()?;
            let kind = handler.kind();
            match handler.pull(&self.ctx, options).await {
                Ok(handler_report) => report.handlers.push(handler_report),
                Err(err) if err.is_cycle_fatal() => return Err(err),
                Err(err) => {
                    record_sync_error(&self.ctx, SyncScope::Pull(kind), &err.to_string())?;
                    if handler.is_hard_dependency() {
                        let err = SyncError::DependencyFailed {
                            kind,
                            source: Box::new(err),
                        };
                        record_sync_error(&self.ctx, SyncScope::Global, &err.to_string())?;
                        return Err(err);
                    }
                    tracing::warn!(entity = %kind, error = %err, "pull failed, continuing with independent kinds");
                    report.errors.push((kind, err.to_string()));
                }
            }
        }

        report.duration = started.elapsed();
        metadata::save_sync_metadata(
            &self.ctx,
            SyncScope::Global,
            MetadataUpdate {
                count: report.applied(),
                duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
                bytes_downloaded: report.bytes_downloaded(),
                bytes_uploaded: 0,
                error: report.error_summary(),
                timestamp: Some(options.watermark.unwrap_or(start)),
            },
        )?;
        Ok(report)
    }

    async fn run_push(&self) -> SyncResult<PushCycleReport> {
        let started = Instant::now();
        let mut report = PushCycleReport {
            queue: process_queue(&self.ctx).await?,
            ..PushCycleReport::default()
        };

        for handler in self.registry.handlers() {
            self.ctx.check_cancelled()?;
            let kind = handler.kind();
            match handler.push(&self.ctx).await {
                Ok(handler_report) => report.handlers.push(handler_report),
                Err(err) if err.is_cycle_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(entity = %kind, error = %err, "push failed");
                    record_sync_error(&self.ctx, SyncScope::Push(kind), &err.to_string())?;
                    report.errors.push((kind, err.to_string()));
                }
            }
        }
        report.duration = started.elapsed();
        Ok(report)
    }

    /// Returns true if a background cycle is worth running.
    ///
    /// True while mutations wait or have failed, when the tenant was never
    /// synced, or once the last sync is older than the freshness window.
    pub fn should_run_background_sync(&self) -> SyncResult<bool> {
        let health = self.ctx.queue.health()?;
        if health.pending + health.processing + health.failed > 0 {
            return Ok(true);
        }
        let Some(last) = last_sync_timestamp(&self.ctx, SyncScope::Global)? else {
            return Ok(true);
        };
        let elapsed = Duration::from_millis(self.ctx.now().millis_since(last));
        Ok(elapsed >= self.ctx.config.background_freshness)
    }

    /// Last successful watermark of a scope, `None` if never synced.
    pub fn get_last_sync_timestamp(&self, scope: SyncScope) -> SyncResult<Option<Timestamp>> {
        last_sync_timestamp(&self.ctx, scope)
    }

    /// Tenant-scoped remote collection of a kind.
    pub fn collection_reference(&self, kind: EntityKind) -> SyncResult<CollectionPath> {
        self.ctx.collection(kind)
    }

    /// Records figures for a scope.
    pub fn save_sync_metadata(
        &self,
        scope: SyncScope,
        update: MetadataUpdate,
    ) -> SyncResult<SyncMetadata> {
        metadata::save_sync_metadata(&self.ctx, scope, update)
    }

    /// Forgets both watermarks of a kind.
    pub fn reset_sync_metadata(&self, kind: EntityKind) -> SyncResult<()> {
        metadata::reset_sync_metadata(&self.ctx, kind)
    }

    /// Buffers a create or update of a record already written locally.
    pub fn enqueue_mutation(
        &self,
        operation: MutationOperation,
        record: &Record,
    ) -> SyncResult<QueuedMutation> {
        let mutation = NewMutation::upsert(
            operation,
            record,
            self.ctx.now(),
            self.ctx.config.default_max_retries,
        )?;
        Ok(self.ctx.queue.enqueue(mutation)?)
    }

    /// Buffers a delete of a record already removed locally.
    pub fn enqueue_delete(&self, kind: EntityKind, id: RecordId) -> SyncResult<QueuedMutation> {
        let mutation = NewMutation::delete(kind, id, self.ctx.now(), self.ctx.config.default_max_retries);
        Ok(self.ctx.queue.enqueue(mutation)?)
    }

    /// Queue counts by status.
    pub fn queue_health(&self) -> SyncResult<QueueHealth> {
        Ok(self.ctx.queue.health()?)
    }

    /// Drops delivered mutations.
    pub fn purge_completed_mutations(&self) -> SyncResult<usize> {
        Ok(self.ctx.queue.purge_completed()?)
    }

    /// Delivers the queue outside a cycle.
    pub async fn process_queue(&self) -> SyncResult<QueueReport> {
        self.ctx.ensure_online()?;
        let report = process_queue(&self.ctx).await?;
        let mut stats = self.stats.write();
        stats.mutations_completed += report.completed;
        stats.mutations_exhausted += report.exhausted;
        Ok(report)
    }
}

fn summarize_errors(errors: &[(EntityKind, String)]) -> Option<String> {
    (!errors.is_empty()).then(|| {
        errors
            .iter()
            .map(|(kind, err)| format!("{kind}: {err}"))
            .collect::<Vec<_>>()
            .join(";")
    })
}
