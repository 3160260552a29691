//! Injected collaborators shared by every handler in a cycle.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use fieldsync_core::{EntityKind, LocalStore, MetadataStore, MutationQueue, RecordId, Timestamp, UserId};
use fieldsync_remote::{collection_reference, CollectionPath, RemoteStore, TenantId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The signed-in session as the engine needs it.
pub trait Session: Send + Sync {
    /// Tenant (company) the session belongs to.
    fn current_tenant_id(&self) -> Option<String>;

    /// Signed-in user.
    fn current_user_id(&self) -> Option<UserId>;

    /// Administrators see every route.
    fn is_admin(&self) -> bool;

    /// Routes a non-administrator may see for an entity kind.
    fn accessible_route_ids(&self, kind: EntityKind) -> Vec<RecordId>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Reports whether the device is online.
pub trait NetworkProbe: Send + Sync {
    /// Returns true if a network is available.
    fn is_online(&self) -> bool;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::from_millis(millis)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(now.as_millis()),
        }
    }

    /// Jumps to `now`.
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_millis(), Ordering::SeqCst);
    }

    /// Moves forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// A probe whose answer is set explicitly.
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    /// Creates a probe reporting `online`.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Changes the reported state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkProbe for StaticProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// A fixed session, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct StaticSession {
    tenant: Option<String>,
    user: Option<UserId>,
    admin: bool,
    routes: RwLock<Vec<RecordId>>,
}

impl StaticSession {
    /// Creates a non-admin session with no routes.
    pub fn new(tenant: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            user: Some(UserId::new(user)),
            admin: false,
            routes: RwLock::new(Vec::new()),
        }
    }

    /// A session with no tenant or user.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Grants administrator visibility.
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Sets the accessible routes.
    pub fn with_routes(self, routes: impl IntoIterator<Item = RecordId>) -> Self {
        self.set_routes(routes);
        self
    }

    /// Replaces the accessible routes.
    pub fn set_routes(&self, routes: impl IntoIterator<Item = RecordId>) {
        *self.routes.write() = routes.into_iter().collect();
    }
}

impl Session for StaticSession {
    fn current_tenant_id(&self) -> Option<String> {
        self.tenant.clone()
    }

    fn current_user_id(&self) -> Option<UserId> {
        self.user.clone()
    }

    fn is_admin(&self) -> bool {
        self.admin
    }

    fn accessible_route_ids(&self, _kind: EntityKind) -> Vec<RecordId> {
        self.routes.read().clone()
    }
}

/// Everything a sync cycle touches, built once and passed by reference.
pub struct SyncContext {
    /// Local record store.
    pub local: Arc<dyn LocalStore>,
    /// Remote document store.
    pub remote: Arc<dyn RemoteStore>,
    /// Sync bookkeeping.
    pub metadata: Arc<dyn MetadataStore>,
    /// Offline write buffer.
    pub queue: Arc<dyn MutationQueue>,
    /// Signed-in session.
    pub session: Arc<dyn Session>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Connectivity probe.
    pub network: Arc<dyn NetworkProbe>,
    /// Engine configuration.
    pub config: SyncConfig,
    cancelled: AtomicBool,
}

impl SyncContext {
    /// Creates a context with the wall clock, an always-online probe and
    /// default configuration.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        metadata: Arc<dyn MetadataStore>,
        queue: Arc<dyn MutationQueue>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            local,
            remote,
            metadata,
            queue,
            session,
            clock: Arc::new(SystemClock),
            network: Arc::new(StaticProbe::default()),
            config: SyncConfig::default(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the network probe.
    pub fn with_network(mut self, network: Arc<dyn NetworkProbe>) -> Self {
        self.network = network;
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Current time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Validated tenant of the session.
    pub fn tenant(&self) -> SyncResult<TenantId> {
        let raw = self
            .session
            .current_tenant_id()
            .ok_or_else(|| SyncError::Unauthorized("no tenant in session".into()))?;
        TenantId::new(raw).map_err(|e| SyncError::Unauthorized(e.to_string()))
    }

    /// Signed-in user.
    pub fn user(&self) -> SyncResult<UserId> {
        self.session
            .current_user_id()
            .filter(|user| !user.as_str().is_empty())
            .ok_or_else(|| SyncError::Unauthorized("no user in session".into()))
    }

    /// Tenant-scoped collection of an entity kind.
    pub fn collection(&self, kind: EntityKind) -> SyncResult<CollectionPath> {
        Ok(collection_reference(&self.tenant()?, kind.collection_name())?)
    }

    /// Fails with [`SyncError::NotConnected`] if the probe reports offline.
    pub fn ensure_online(&self) -> SyncResult<()> {
        if self.network.is_online() {
            Ok(())
        } else {
            Err(SyncError::NotConnected("network probe reports offline".into()))
        }
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a cancellation request.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Fails with [`SyncError::Cancelled`] once cancellation was requested.
    pub fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::{MemoryLocalStore, MemoryMetadataStore, MemoryMutationQueue};
    use fieldsync_remote::MemoryRemoteStore;

    fn context(session: StaticSession) -> SyncContext {
        SyncContext::new(
            Arc::new(MemoryLocalStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryMutationQueue::new()),
            Arc::new(session),
        )
    }

    #[test]
    fn collection_is_scoped_by_session_tenant() {
        let ctx = context(StaticSession::new("acme", "u1"));
        let path = ctx.collection(EntityKind::Client).unwrap();
        assert_eq!(path.to_string(), "tenants/acme/entities/clients/items");
    }

    #[test]
    fn missing_or_invalid_tenant_is_unauthorized() {
        let ctx = context(StaticSession::signed_out());
        assert!(matches!(ctx.tenant(), Err(SyncError::Unauthorized(_))));
        assert!(matches!(ctx.user(), Err(SyncError::Unauthorized(_))));

        let ctx = context(StaticSession::new("a/b", "u1"));
        assert!(ctx.tenant().unwrap_err().is_authorization());
    }

    #[test]
    fn cancellation_flag() {
        let ctx = context(StaticSession::new("acme", "u1"));
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(SyncError::Cancelled)));
        ctx.reset_cancel();
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn probe_controls_connectivity() {
        let probe = Arc::new(StaticProbe::new(false));
        let ctx = context(StaticSession::new("acme", "u1")).with_network(probe.clone());
        assert!(ctx.ensure_online().unwrap_err().is_connectivity());
        probe.set_online(true);
        assert!(ctx.ensure_online().is_ok());
    }

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new(Timestamp::from_millis(1_000));
        clock.advance(500);
        assert_eq!(clock.now(), Timestamp::from_millis(1_500));
        clock.set(Timestamp::from_millis(10));
        assert_eq!(clock.now(), Timestamp::from_millis(10));
    }

    #[test]
    fn static_session_routes() {
        let session = StaticSession::new("acme", "u1").with_routes([RecordId::new(10)]);
        assert_eq!(session.accessible_route_ids(EntityKind::Client), vec![RecordId::new(10)]);
        session.set_routes(Vec::<RecordId>::new());
        assert!(session.accessible_route_ids(EntityKind::Client).is_empty());
        assert!(!session.is_admin());
    }
}
