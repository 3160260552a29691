//! Per-entity pull and push.
//!
//! A handler moves one entity kind (and the kinds it owns) between the local
//! and remote stores:
//!
//! - **Pull**: complete or incremental, route-filtered, paginated; every
//!   fetched document passes the visibility re-check and the referential
//!   guard before conflict resolution applies it.
//! - **Push**: every local row modified since the push watermark is upserted
//!   under its own id, stamped with the push time so incremental pulls on
//!   other devices see it.
//!
//! Per-record failures are counted and skipped. Connectivity, authorization
//! and cancellation errors end the call.

use crate::access::{is_owned_by, plan_queries, QueryPlan, RouteAccess};
use crate::conflict::{apply_remote, ApplyOutcome};
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::mapping::{document_to_record, record_to_document, ID_FIELD, MODIFIED_FIELD};
use crate::metadata::{last_sync_timestamp, record_sync_error, save_sync_metadata, MetadataUpdate};
use crate::pager::Pager;
use crate::profile::{EntityProfile, RouteFallback, RouteScope};
use async_trait::async_trait;
use fieldsync_core::{
    EntityKind, LocalStore, MutationOperation, NewMutation, Record, RecordId, SyncScope, Timestamp,
    UserId,
};
use fieldsync_remote::{Document, Query};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;

/// Options for one pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Watermark recorded on success instead of the clock reading at start.
    pub watermark: Option<Timestamp>,
    /// Ignore stored metadata and pull the whole collection.
    pub full: bool,
}

impl PullOptions {
    /// Options forcing a complete pull.
    pub fn full() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }

    /// Options recording `watermark` on success.
    pub fn with_watermark(watermark: Timestamp) -> Self {
        Self {
            watermark: Some(watermark),
            ..Self::default()
        }
    }
}

/// How a pull pass selected documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullMode {
    /// Whole collection.
    Complete,
    /// Documents modified after the watermark.
    Incremental,
    /// Nothing queried: no accessible routes.
    Suppressed,
}

/// Outcome of pulling one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// Kind pulled.
    pub kind: EntityKind,
    /// How documents were selected.
    pub mode: PullMode,
    /// Records inserted, updated or reconciled.
    pub applied: u64,
    /// Records where the local version was kept.
    pub unchanged: u64,
    /// Records skipped because a parent is missing locally.
    pub deferred: u64,
    /// Records outside the session's routes.
    pub out_of_scope: u64,
    /// Records that failed to map or write.
    pub failed: u64,
    /// Documents fetched.
    pub documents: u64,
    /// Pages fetched.
    pub pages: u64,
    /// Encoded size of fetched documents.
    pub bytes_downloaded: u64,
    /// Reports of owned kinds.
    pub children: Vec<PullReport>,
    /// Failures of owned kinds.
    pub child_errors: Vec<String>,
}

impl PullReport {
    fn new(kind: EntityKind, mode: PullMode) -> Self {
        Self {
            kind,
            mode,
            applied: 0,
            unchanged: 0,
            deferred: 0,
            out_of_scope: 0,
            failed: 0,
            documents: 0,
            pages: 0,
            bytes_downloaded: 0,
            children: Vec::new(),
            child_errors: Vec::new(),
        }
    }

    /// Applied records including owned kinds.
    pub fn total_applied(&self) -> u64 {
        self.applied + self.children.iter().map(PullReport::total_applied).sum::<u64>()
    }

    /// Deferred records including owned kinds.
    pub fn total_deferred(&self) -> u64 {
        self.deferred + self.children.iter().map(PullReport::total_deferred).sum::<u64>()
    }

    /// Out-of-scope records including owned kinds.
    pub fn total_out_of_scope(&self) -> u64 {
        self.out_of_scope
            + self
                .children
                .iter()
                .map(PullReport::total_out_of_scope)
                .sum::<u64>()
    }

    /// Failed records including owned kinds.
    pub fn total_failed(&self) -> u64 {
        self.failed + self.children.iter().map(PullReport::total_failed).sum::<u64>()
    }
}

/// Outcome of pushing one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// Kind pushed.
    pub kind: EntityKind,
    /// Rows modified since the push watermark.
    pub selected: u64,
    /// Rows written.
    pub pushed: u64,
    /// Rows rejected individually.
    pub failed: u64,
    /// Encoded size of written documents.
    pub bytes_uploaded: u64,
    /// Reports of owned kinds.
    pub children: Vec<PushReport>,
    /// Failures of owned kinds.
    pub child_errors: Vec<String>,
}

impl PushReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            selected: 0,
            pushed: 0,
            failed: 0,
            bytes_uploaded: 0,
            children: Vec::new(),
            child_errors: Vec::new(),
        }
    }

    /// Pushed rows including owned kinds.
    pub fn total_pushed(&self) -> u64 {
        self.pushed + self.children.iter().map(PushReport::total_pushed).sum::<u64>()
    }

    /// Failed rows including owned kinds.
    pub fn total_failed(&self) -> u64 {
        self.failed + self.children.iter().map(PushReport::total_failed).sum::<u64>()
    }
}

/// Moves one entity kind between the local and remote stores.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Kind handled.
    fn kind(&self) -> EntityKind;

    /// Returns true if a failed pull must stop the rest of the cycle.
    fn is_hard_dependency(&self) -> bool {
        false
    }

    /// Pulls remote changes into the local store.
    async fn pull(&self, ctx: &SyncContext, options: PullOptions) -> SyncResult<PullReport>;

    /// Pushes local changes to the remote store.
    async fn push(&self, ctx: &SyncContext) -> SyncResult<PushReport>;
}

/// Returns true if the parent record exists locally.
pub fn ensure_entity_exists(ctx: &SyncContext, kind: EntityKind, id: RecordId) -> SyncResult<bool> {
    Ok(ctx.local.exists(kind, id)?)
}

/// Copy of `record` whose modification time is the push time.
///
/// A time already in the future of `pushed_at` is kept.
pub(crate) fn stamp_for_push(record: &Record, pushed_at: Timestamp) -> Record {
    let mut stamped = record.clone();
    stamped.last_modified = pushed_at.max(record.last_modified);
    stamped
}

/// Writes the push stamp back to the local row.
///
/// Skipped when the row was edited or removed after `sent` was read.
pub(crate) fn keep_push_stamp(local: &dyn LocalStore, sent: &Record, stamped: Record) -> SyncResult<()> {
    if stamped.last_modified == sent.last_modified {
        return Ok(());
    }
    match local.get(sent.kind, sent.id)? {
        Some(current) if current.last_modified == sent.last_modified => local.upsert(stamped)?,
        _ => tracing::debug!(entity = %sent.kind, id = %sent.id, "row changed during push, stamp not kept"),
    }
    Ok(())
}

/// Route a record belongs to, following local parents when needed.
///
/// `None` when the kind is not route scoped or a parent is not known yet.
pub fn route_of(local: &dyn LocalStore, record: &Record) -> SyncResult<Option<RecordId>> {
    let mut step = route_step(record);
    loop {
        match step {
            RouteStep::Resolved(route) => return Ok(route),
            RouteStep::Parent(kind, id) => match local.get(kind, id)? {
                Some(parent) => step = route_step(&parent),
                None => return Ok(None),
            },
        }
    }
}

enum RouteStep {
    Resolved(Option<RecordId>),
    Parent(EntityKind, RecordId),
}

fn route_step(record: &Record) -> RouteStep {
    match EntityProfile::for_kind(record.kind).route_scope {
        RouteScope::Field(ID_FIELD) => RouteStep::Resolved(Some(record.id)),
        RouteScope::Field(field) => RouteStep::Resolved(record.reference(field)),
        RouteScope::ViaParent(parent) => match record.reference(parent.reference_field()) {
            Some(id) => RouteStep::Parent(parent, id),
            None => RouteStep::Resolved(None),
        },
        RouteScope::Unscoped | RouteScope::Owner(_) => RouteStep::Resolved(None),
    }
}

/// What happened to one fetched document.
enum Disposition {
    Applied,
    Unchanged,
    Deferred { parent: EntityKind, parent_id: RecordId },
    OutOfScope,
}

/// Scratch state of one pull pass.
struct PullPass<'a> {
    ctx: &'a SyncContext,
    profile: EntityProfile,
    access: RouteAccess,
    user: UserId,
    report: PullReport,
    retry_floor: Option<Timestamp>,
    errors: Vec<String>,
    /// Ids replaced by a reconciliation whose remote delete is still queued.
    retired: HashSet<RecordId>,
}

impl<'a> PullPass<'a> {
    fn lower_floor(&mut self, ts: Timestamp) {
        self.retry_floor = Some(self.retry_floor.map_or(ts, |floor| floor.min(ts)));
    }

    async fn run(&mut self, queries: Vec<Query>) -> SyncResult<()> {
        for query in queries {
            let mut pager = Pager::new(query, self.ctx.config.page_size);
            loop {
                self.ctx.check_cancelled()?;
                let page = pager.next_page(self.ctx.remote.as_ref()).await?;
                let Some(page) = page else { break };
                for document in &page {
                    self.document(document)?;
                }
            }
            self.report.pages += pager.pages() as u64;
            self.report.bytes_downloaded += pager.bytes();
        }
        Ok(())
    }

    fn document(&mut self, document: &Document) -> SyncResult<()> {
        self.report.documents += 1;
        let kind = self.profile.kind;
        let record = match document_to_record(kind, document) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(entity = %kind, document = %document.id, error = %err, "skipping unreadable document");
                self.report.failed += 1;
                self.errors.push(err.to_string());
                return Ok(());
            }
        };
        let last_modified = record.last_modified;
        let id = record.id;

        match self.apply(record) {
            Ok(Disposition::Applied) => self.report.applied += 1,
            Ok(Disposition::Unchanged) => self.report.unchanged += 1,
            Ok(Disposition::OutOfScope) => self.report.out_of_scope += 1,
            Ok(Disposition::Deferred { parent, parent_id }) => {
                tracing::debug!(entity = %kind, %id, %parent, %parent_id, "parent missing, deferring");
                self.report.deferred += 1;
                self.lower_floor(last_modified);
            }
            Err(err) if err.is_cycle_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(entity = %kind, %id, error = %err, "failed to apply pulled record");
                self.report.failed += 1;
                self.lower_floor(last_modified);
                self.errors.push(err.to_string());
            }
        }
        Ok(())
    }

    fn apply(&mut self, record: Record) -> SyncResult<Disposition> {
        if self.retired.contains(&record.id) {
            return Ok(Disposition::Unchanged);
        }
        if !self.is_visible(&record)? {
            return Ok(Disposition::OutOfScope);
        }
        for parent in self.profile.parents {
            let Some(parent_id) = record.reference(parent.field) else {
                continue;
            };
            if ensure_entity_exists(self.ctx, parent.kind, parent_id)? {
                continue;
            }
            let route_allows = parent.fallback == RouteFallback::OwnRoute
                && record
                    .reference("route_id")
                    .is_some_and(|route| self.access.allows(route));
            if !route_allows {
                return Ok(Disposition::Deferred {
                    parent: parent.kind,
                    parent_id,
                });
            }
        }
        let outcome = apply_remote(self.ctx.local.as_ref(), record, self.ctx.now())?;
        if let ApplyOutcome::Reconciled { previous_id, migrated } = &outcome {
            tracing::info!(
                entity = %self.profile.kind,
                %previous_id,
                migrated = migrated.len(),
                "reconciled local duplicate"
            );
            self.queue_reconciliation(*previous_id, migrated)?;
        }
        Ok(if outcome.is_applied() {
            Disposition::Applied
        } else {
            Disposition::Unchanged
        })
    }

    /// Queues the remote delete of the replaced duplicate and the rewritten
    /// references, so other devices converge on the surviving id.
    fn queue_reconciliation(&mut self, previous_id: RecordId, migrated: &[Record]) -> SyncResult<()> {
        let now = self.ctx.now();
        let retries = self.ctx.config.default_max_retries;
        self.ctx
            .queue
            .enqueue(NewMutation::delete(self.profile.kind, previous_id, now, retries))?;
        for record in migrated {
            self.ctx
                .queue
                .enqueue(NewMutation::upsert(MutationOperation::Update, record, now, retries)?)?;
        }
        self.retired.insert(previous_id);
        Ok(())
    }

    fn is_visible(&self, record: &Record) -> SyncResult<bool> {
        if self.access == RouteAccess::All {
            return Ok(true);
        }
        match self.profile.route_scope {
            RouteScope::Unscoped => Ok(true),
            RouteScope::Owner(field) => Ok(is_owned_by(record.field(field), &self.user)),
            RouteScope::Field(_) | RouteScope::ViaParent(_) => {
                Ok(route_of(self.ctx.local.as_ref(), record)?.map_or(true, |r| self.access.allows(r)))
            }
        }
    }
}

/// Handler driven entirely by the kind's [`EntityProfile`].
#[derive(Debug, Clone, Copy)]
pub struct EntityHandler {
    profile: EntityProfile,
}

impl EntityHandler {
    /// Creates the handler for a kind.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            profile: EntityProfile::for_kind(kind),
        }
    }

    /// Profile in use.
    pub fn profile(&self) -> &EntityProfile {
        &self.profile
    }

    fn base_query(&self, ctx: &SyncContext, since: Option<Timestamp>) -> SyncResult<Query> {
        let query = Query::new(ctx.collection(self.profile.kind)?);
        Ok(match since {
            Some(ts) => query
                .where_greater_than(MODIFIED_FIELD, ts.as_millis())
                .order_by(MODIFIED_FIELD),
            None => query,
        })
    }

    fn plan(&self, pass: &PullPass<'_>, since: Option<Timestamp>) -> SyncResult<QueryPlan> {
        let base = self.base_query(pass.ctx, since)?;
        Ok(plan_queries(pass.ctx, &self.profile, base, &pass.access, &pass.user))
    }

    async fn pull_own(&self, ctx: &SyncContext, options: PullOptions) -> SyncResult<PullReport> {
        let kind = self.profile.kind;
        let started = Instant::now();
        let start = ctx.now();
        let user = ctx.user()?;
        let since = if options.full {
            None
        } else {
            last_sync_timestamp(ctx, SyncScope::Pull(kind))?
        };
        let mode = if since.is_some() {
            PullMode::Incremental
        } else {
            PullMode::Complete
        };

        let mut pass = PullPass {
            ctx,
            profile: self.profile,
            access: RouteAccess::for_kind(ctx, kind),
            user,
            report: PullReport::new(kind, mode),
            retry_floor: None,
            errors: Vec::new(),
            retired: pending_deletes(ctx, kind)?,
        };

        let QueryPlan::Run(queries) = self.plan(&pass, since)? else {
            tracing::debug!(entity = %kind, "no accessible routes, pull suppressed");
            pass.report.mode = PullMode::Suppressed;
            return Ok(pass.report);
        };

        let fallback = ctx.config.incremental_fallback && since.is_some();
        match pass.run(queries).await {
            Ok(()) => {}
            Err(SyncError::Remote(err)) if fallback && !err.is_transport() && !err.is_permission() => {
                tracing::warn!(entity = %kind, error = %err, "incremental query failed, pulling everything");
                self.complete_pass(&mut pass).await?;
            }
            Err(err) => return Err(err),
        }
        if fallback && pass.report.mode == PullMode::Incremental && pass.report.documents == 0 && ctx.local.count(kind)? == 0 {
            tracing::info!(entity = %kind, "local table empty, pulling everything");
            self.complete_pass(&mut pass).await?;
        }

        let mut watermark = options.watermark.unwrap_or(start);
        if let Some(floor) = pass.retry_floor {
            watermark = watermark.min(floor.just_before());
        }
        let report = pass.report;
        save_sync_metadata(
            ctx,
            SyncScope::Pull(kind),
            MetadataUpdate {
                count: report.applied,
                duration_ms: elapsed_ms(started),
                bytes_downloaded: report.bytes_downloaded,
                bytes_uploaded: 0,
                error: summarize(&pass.errors),
                timestamp: Some(watermark),
            },
        )?;
        tracing::info!(
            entity = %kind,
            mode = ?report.mode,
            applied = report.applied,
            deferred = report.deferred,
            failed = report.failed,
            "pull complete"
        );
        Ok(report)
    }

    async fn complete_pass(&self, pass: &mut PullPass<'_>) -> SyncResult<()> {
        pass.report.mode = PullMode::Complete;
        match self.plan(pass, None)? {
            QueryPlan::Run(queries) => pass.run(queries).await,
            QueryPlan::Suppressed => Ok(()),
        }
    }

    async fn push_own(&self, ctx: &SyncContext) -> SyncResult<PushReport> {
        let kind = self.profile.kind;
        let started = Instant::now();
        let start = ctx.now();
        let collection = ctx.collection(kind)?;
        let since = last_sync_timestamp(ctx, SyncScope::Push(kind))?.unwrap_or(Timestamp::ZERO);
        let rows = ctx.local.query_changed_since(kind, since)?;

        let mut report = PushReport::new(kind);
        report.selected = rows.len() as u64;
        let mut failed_floor: Option<Timestamp> = None;
        let mut errors = Vec::new();

        for record in rows {
            ctx.check_cancelled()?;
            let stamped = stamp_for_push(&record, start);
            let document = record_to_document(&stamped);
            let size = document.encoded_len();
            match ctx.remote.set_document(&collection, document).await {
                Ok(()) => {
                    keep_push_stamp(ctx.local.as_ref(), &record, stamped)?;
                    report.pushed += 1;
                    report.bytes_uploaded += size;
                }
                Err(err) if err.is_transport() || err.is_permission() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(entity = %kind, id = %record.id, error = %err, "remote rejected record");
                    report.failed += 1;
                    errors.push(format!("{}: {err}", record.id));
                    let lm = record.last_modified;
                    failed_floor = Some(failed_floor.map_or(lm, |floor| floor.min(lm)));
                }
            }
        }

        let watermark = failed_floor.map_or(start, |floor| start.min(floor.just_before()));
        save_sync_metadata(
            ctx,
            SyncScope::Push(kind),
            MetadataUpdate {
                count: report.pushed,
                duration_ms: elapsed_ms(started),
                bytes_downloaded: 0,
                bytes_uploaded: report.bytes_uploaded,
                error: summarize(&errors),
                timestamp: Some(watermark),
            },
        )?;
        tracing::info!(entity = %kind, pushed = report.pushed, failed = report.failed, "push complete");
        Ok(report)
    }
}

#[async_trait]
impl SyncHandler for EntityHandler {
    fn kind(&self) -> EntityKind {
        self.profile.kind
    }

    fn is_hard_dependency(&self) -> bool {
        self.profile.hard_dependency
    }

    async fn pull(&self, ctx: &SyncContext, options: PullOptions) -> SyncResult<PullReport> {
        let mut report = self.pull_own(ctx, options).await?;
        for child in self.profile.children {
            match EntityHandler::new(*child).pull_own(ctx, options).await {
                Ok(child_report) => report.children.push(child_report),
                Err(err) if err.is_cycle_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(entity = %child, error = %err, "owned kind pull failed");
                    record_sync_error(ctx, SyncScope::Pull(*child), &err.to_string())?;
                    report.child_errors.push(format!("{child}: {err}"));
                }
            }
        }
        Ok(report)
    }

    async fn push(&self, ctx: &SyncContext) -> SyncResult<PushReport> {
        let mut report = self.push_own(ctx).await?;
        for child in self.profile.children {
            match EntityHandler::new(*child).push_own(ctx).await {
                Ok(child_report) => report.children.push(child_report),
                Err(err) if err.is_cycle_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(entity = %child, error = %err, "owned kind push failed");
                    record_sync_error(ctx, SyncScope::Push(*child), &err.to_string())?;
                    report.child_errors.push(format!("{child}: {err}"));
                }
            }
        }
        Ok(report)
    }
}

/// Ids of `kind` with a remote delete still waiting in the queue.
fn pending_deletes(ctx: &SyncContext, kind: EntityKind) -> SyncResult<HashSet<RecordId>> {
    Ok(ctx
        .queue
        .list()?
        .into_iter()
        .filter(|m| m.entity_type == kind && m.operation == MutationOperation::Delete && !m.status.is_terminal())
        .map(|m| m.entity_id)
        .collect())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn summarize(errors: &[String]) -> Option<String> {
    const SHOWN: usize = 3;
    match errors.len() {
        0 => None,
        n if n <= SHOWN => Some(errors.join("; ")),
        n => Some(format!("{} (+{} more)", errors[..SHOWN].join("; "), n - SHOWN)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::context::{ManualClock, StaticSession};
    use fieldsync_core::{MemoryLocalStore, MemoryMetadataStore, MemoryMutationQueue};
    use fieldsync_remote::{collection_reference, MemoryRemoteStore, RemoteError, TenantId};
    use std::sync::Arc;

    struct Harness {
        ctx: SyncContext,
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        clock: Arc<ManualClock>,
    }

    fn harness(session: StaticSession) -> Harness {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(10_000)));
        let ctx = SyncContext::new(
            local.clone(),
            remote.clone(),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryMutationQueue::new()),
            Arc::new(session),
        )
        .with_clock(clock.clone())
        .with_config(SyncConfig::new().with_page_size(500));
        Harness {
            ctx,
            local,
            remote,
            clock,
        }
    }

    fn admin() -> StaticSession {
        StaticSession::new("acme", "1").with_admin(true)
    }

    fn seed(h: &Harness, kind: EntityKind, doc: Document) {
        let path = collection_reference(&TenantId::new("acme").unwrap(), kind.collection_name()).unwrap();
        h.remote.insert(&path, doc);
    }

    fn client_doc(id: i64, route: i64, lm: i64) -> Document {
        Document::new(id.to_string())
            .with_field("name", format!("client {id}"))
            .with_field("route_id", route)
            .with_field("last_modified", lm)
    }

    #[tokio::test]
    async fn first_pull_is_complete_and_later_pull_is_incremental() {
        let h = harness(admin());
        seed(&h, EntityKind::Client, client_doc(1, 10, 100));
        let handler = EntityHandler::new(EntityKind::Client);

        let first = handler.pull(&h.ctx, PullOptions::default()).await.unwrap();
        assert_eq!(first.mode, PullMode::Complete);
        assert_eq!(first.applied, 1);

        seed(&h, EntityKind::Client, client_doc(2, 10, 20_000));
        let second = handler.pull(&h.ctx, PullOptions::default()).await.unwrap();
        assert_eq!(second.mode, PullMode::Incremental);
        assert_eq!(second.applied, 1);
        assert!(h.remote.query_log().last().unwrap().is_incremental());
    }

    #[tokio::test]
    async fn repeated_complete_pull_applies_nothing_new() {
        let h = harness(admin());
        seed(&h, EntityKind::Client, client_doc(1, 10, 100));
        let handler = EntityHandler::new(EntityKind::Client);
        handler.pull(&h.ctx, PullOptions::full()).await.unwrap();
        let again = handler.pull(&h.ctx, PullOptions::full()).await.unwrap();
        assert_eq!(again.applied, 0);
        assert_eq!(again.unchanged, 1);
    }

    #[tokio::test]
    async fn out_of_scope_documents_are_not_stored() {
        let h = harness(StaticSession::new("acme", "1").with_routes([RecordId::new(10)]));
        seed(&h, EntityKind::Table, Document::new("5").with_field("client_id", 2).with_field("last_modified", 1));
        h.local
            .upsert(Record::new(EntityKind::Client, RecordId::new(2), Timestamp::from_millis(1)).with_field("route_id", 99))
            .unwrap();

        let report = EntityHandler::new(EntityKind::Table)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!(report.out_of_scope, 1);
        assert_eq!(h.local.count(EntityKind::Table).unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_parent_defers_child_and_lowers_watermark() {
        let h = harness(admin());
        seed(&h, EntityKind::Table, Document::new("5").with_field("client_id", 42).with_field("last_modified", 700));

        let report = EntityHandler::new(EntityKind::Table)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(h.local.count(EntityKind::Table).unwrap(), 0);
        assert_eq!(
            last_sync_timestamp(&h.ctx, SyncScope::Pull(EntityKind::Table)).unwrap(),
            Some(Timestamp::from_millis(699))
        );
    }

    #[tokio::test]
    async fn own_route_fallback_accepts_child_without_parent() {
        let h = harness(StaticSession::new("acme", "1").with_routes([RecordId::new(10)]));
        seed(
            &h,
            EntityKind::Expense,
            Document::new("3")
                .with_field("cycle_id", 77)
                .with_field("route_id", 10)
                .with_field("last_modified", 5),
        );
        let report = EntityHandler::new(EntityKind::Expense)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.deferred, 0);
    }

    #[tokio::test]
    async fn empty_route_set_queries_nothing_and_writes_no_watermark() {
        let h = harness(StaticSession::new("acme", "1"));
        seed(&h, EntityKind::Client, client_doc(1, 10, 100));
        let report = EntityHandler::new(EntityKind::Client)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!(report.mode, PullMode::Suppressed);
        assert_eq!(h.remote.query_count(), 0);
        assert_eq!(last_sync_timestamp(&h.ctx, SyncScope::Pull(EntityKind::Client)).unwrap(), None);
    }

    #[tokio::test]
    async fn failing_incremental_query_falls_back_to_complete() {
        let h = harness(admin());
        seed(&h, EntityKind::Route, Document::new("10").with_field("name", "north").with_field("last_modified", 1));
        let handler = EntityHandler::new(EntityKind::Route);
        handler.pull(&h.ctx, PullOptions::default()).await.unwrap();

        h.remote.fail_incremental_queries("routes", RemoteError::FailedPrecondition("index".into()));
        let report = handler.pull(&h.ctx, PullOptions::default()).await.unwrap();
        assert_eq!(report.mode, PullMode::Complete);
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn empty_local_table_falls_back_to_complete() {
        let h = harness(admin());
        seed(&h, EntityKind::Vehicle, Document::new("1").with_field("plate", "AB-1").with_field("last_modified", 1));
        let handler = EntityHandler::new(EntityKind::Vehicle);
        handler.pull(&h.ctx, PullOptions::default()).await.unwrap();
        h.local.delete(EntityKind::Vehicle, RecordId::new(1)).unwrap();

        let report = handler.pull(&h.ctx, PullOptions::default()).await.unwrap();
        assert_eq!(report.mode, PullMode::Complete);
        assert_eq!(report.applied, 1);
    }

    #[tokio::test]
    async fn unreadable_document_is_counted_and_skipped() {
        let h = harness(admin());
        seed(&h, EntityKind::Vehicle, Document::new("not-a-number"));
        seed(&h, EntityKind::Vehicle, Document::new("2").with_field("plate", "B"));
        let report = EntityHandler::new(EntityKind::Vehicle)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.applied, 1);
    }

    #[tokio::test]
    async fn push_sends_changed_rows_once() {
        let h = harness(admin());
        h.local
            .upsert(Record::new(EntityKind::Vehicle, RecordId::new(1), Timestamp::from_millis(5)).with_field("plate", "A"))
            .unwrap();
        let handler = EntityHandler::new(EntityKind::Vehicle);

        let first = handler.push(&h.ctx).await.unwrap();
        assert_eq!(first.pushed, 1);
        assert!(first.bytes_uploaded > 0);

        h.clock.advance(1_000);
        let second = handler.push(&h.ctx).await.unwrap();
        assert_eq!(second.selected, 0);
        assert_eq!(h.remote.write_count(), 1);
    }

    #[tokio::test]
    async fn rejected_row_is_reselected_next_push() {
        let h = harness(admin());
        for (id, lm) in [(1, 50), (2, 60)] {
            h.local
                .upsert(Record::new(EntityKind::Vehicle, RecordId::new(id), Timestamp::from_millis(lm)))
                .unwrap();
        }
        h.remote.fail_writes("vehicles", "2", RemoteError::InvalidArgument("bad".into()));
        let handler = EntityHandler::new(EntityKind::Vehicle);
        let report = handler.push(&h.ctx).await.unwrap();
        assert_eq!((report.pushed, report.failed), (1, 1));

        h.remote.clear_faults();
        let retry = handler.push(&h.ctx).await.unwrap();
        // row 1 carries the first push's stamp, above the lowered watermark
        assert_eq!(retry.selected, 2);
        assert_eq!((retry.pushed, retry.failed), (2, 0));
        let path = collection_reference(&TenantId::new("acme").unwrap(), "vehicles").unwrap();
        assert_eq!(h.remote.documents(&path).len(), 2);
    }

    #[tokio::test]
    async fn push_stamps_remote_and_local_with_push_time() {
        let h = harness(admin());
        h.local
            .upsert(Record::new(EntityKind::Vehicle, RecordId::new(1), Timestamp::from_millis(5)).with_field("plate", "A"))
            .unwrap();
        EntityHandler::new(EntityKind::Vehicle).push(&h.ctx).await.unwrap();

        let path = collection_reference(&TenantId::new("acme").unwrap(), "vehicles").unwrap();
        let docs = h.remote.documents(&path);
        assert_eq!(docs[0].get(MODIFIED_FIELD).unwrap(), 10_000);
        let local = h.local.get(EntityKind::Vehicle, RecordId::new(1)).unwrap().unwrap();
        assert_eq!(local.last_modified, Timestamp::from_millis(10_000));
    }

    #[test]
    fn push_stamp_is_not_kept_over_a_newer_edit() {
        let local = MemoryLocalStore::new();
        let sent = Record::new(EntityKind::Vehicle, RecordId::new(1), Timestamp::from_millis(5));
        local
            .upsert(Record::new(EntityKind::Vehicle, RecordId::new(1), Timestamp::from_millis(8)).with_field("plate", "edited"))
            .unwrap();
        keep_push_stamp(&local, &sent, stamp_for_push(&sent, Timestamp::from_millis(100))).unwrap();

        let stored = local.get(EntityKind::Vehicle, RecordId::new(1)).unwrap().unwrap();
        assert_eq!(stored.last_modified, Timestamp::from_millis(8));
        assert_eq!(stored.field("plate").unwrap(), "edited");
    }

    #[tokio::test]
    async fn transport_failure_aborts_push_without_metadata() {
        let h = harness(admin());
        h.local
            .upsert(Record::new(EntityKind::Vehicle, RecordId::new(1), Timestamp::from_millis(5)))
            .unwrap();
        h.remote.set_online(false);
        let err = EntityHandler::new(EntityKind::Vehicle).push(&h.ctx).await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(last_sync_timestamp(&h.ctx, SyncScope::Push(EntityKind::Vehicle)).unwrap(), None);
    }

    #[tokio::test]
    async fn settlement_handler_pulls_its_lines() {
        let h = harness(admin());
        h.local
            .upsert(Record::new(EntityKind::Client, RecordId::new(1), Timestamp::from_millis(1)).with_field("route_id", 10))
            .unwrap();
        h.local
            .upsert(Record::new(EntityKind::Table, RecordId::new(4), Timestamp::from_millis(1)).with_field("client_id", 1))
            .unwrap();
        seed(
            &h,
            EntityKind::Settlement,
            Document::new("8").with_field("client_id", 1).with_field("route_id", 10).with_field("last_modified", 3),
        );
        seed(
            &h,
            EntityKind::SettlementLine,
            Document::new("80").with_field("settlement_id", 8).with_field("table_id", 4).with_field("last_modified", 3),
        );

        let report = EntityHandler::new(EntityKind::Settlement)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.children.len(), 1);
        assert_eq!(report.children[0].kind, EntityKind::SettlementLine);
        assert_eq!(report.total_applied(), 2);
    }

    #[tokio::test]
    async fn replaced_duplicate_is_not_pulled_back() {
        let h = harness(admin());
        h.local
            .upsert(Record::new(EntityKind::Client, RecordId::new(700), Timestamp::from_millis(1)).with_field("name", "X").with_field("route_id", 10))
            .unwrap();
        h.local
            .upsert(Record::new(EntityKind::Table, RecordId::new(7), Timestamp::from_millis(1)).with_field("client_id", 700))
            .unwrap();
        seed(&h, EntityKind::Client, Document::new("555").with_field("name", "X").with_field("route_id", 10).with_field("last_modified", 5));
        seed(&h, EntityKind::Client, Document::new("700").with_field("name", "X").with_field("route_id", 10).with_field("last_modified", 1));

        let report = EntityHandler::new(EntityKind::Client)
            .pull(&h.ctx, PullOptions::default())
            .await
            .unwrap();
        assert_eq!((report.applied, report.unchanged), (1, 1));
        assert!(h.local.get(EntityKind::Client, RecordId::new(555)).unwrap().is_some());
        assert!(h.local.get(EntityKind::Client, RecordId::new(700)).unwrap().is_none());

        let queued = h.ctx.queue.list().unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].operation, MutationOperation::Delete);
        assert_eq!(queued[0].entity_id, RecordId::new(700));
        assert_eq!((queued[1].entity_type, queued[1].entity_id), (EntityKind::Table, RecordId::new(7)));
    }

    #[test]
    fn route_resolves_through_parent_chain() {
        let local = MemoryLocalStore::with_records([
            Record::new(EntityKind::Client, RecordId::new(1), Timestamp::ZERO).with_field("route_id", 10),
            Record::new(EntityKind::Contract, RecordId::new(2), Timestamp::ZERO).with_field("client_id", 1),
        ]);
        let amendment = Record::new(EntityKind::ContractAmendment, RecordId::new(3), Timestamp::ZERO)
            .with_field("contract_id", 2);
        assert_eq!(route_of(&local, &amendment).unwrap(), Some(RecordId::new(10)));

        let orphan = Record::new(EntityKind::Table, RecordId::new(9), Timestamp::ZERO).with_field("client_id", 5);
        assert_eq!(route_of(&local, &orphan).unwrap(), None);
    }

    #[test]
    fn error_summary_is_bounded() {
        let errors: Vec<String> = (0..5).map(|i| format!("e{i}")).collect();
        assert_eq!(summarize(&errors).unwrap(), "e0; e1; e2 (+2 more)");
        assert_eq!(summarize(&[]), None);
    }
}
