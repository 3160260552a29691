//! Test environments and record builders.
//!
//! A [`TestEnv`] keeps typed handles to every in-memory seam next to the
//! orchestrator built from them, so tests can seed, fault and inspect
//! stores directly.

use fieldsync_core::{
    EntityKind, MemoryLocalStore, MemoryMetadataStore, MemoryMutationQueue, Record, RecordId,
    SyncScope, Timestamp,
};
use fieldsync_engine::{
    record_to_document, ManualClock, StaticProbe, StaticSession, SyncConfig, SyncContext,
    SyncOrchestrator,
};
use fieldsync_remote::{collection_reference, CollectionPath, Document, MemoryRemoteStore, TenantId};
use std::sync::Arc;

/// Tenant used when a test does not pick one.
pub const TEST_TENANT: &str = "acme";

/// User used when a test does not pick one.
pub const TEST_USER: &str = "1";

/// Clock reading every environment starts at.
pub const TEST_START: i64 = 1_000_000;

/// A wired sync environment.
pub struct TestEnv {
    /// Local records.
    pub local: Arc<MemoryLocalStore>,
    /// Remote documents, possibly shared with other environments.
    pub remote: Arc<MemoryRemoteStore>,
    /// Sync metadata rows.
    pub metadata: Arc<MemoryMetadataStore>,
    /// Offline write buffer.
    pub queue: Arc<MemoryMutationQueue>,
    /// Signed-in session.
    pub session: Arc<StaticSession>,
    /// Time source.
    pub clock: Arc<ManualClock>,
    /// Connectivity switch.
    pub probe: Arc<StaticProbe>,
    /// Orchestrator over the standard registry.
    pub orchestrator: SyncOrchestrator,
    tenant: String,
}

/// Builder for [`TestEnv`].
#[derive(Debug, Clone)]
pub struct TestEnvBuilder {
    tenant: String,
    user: String,
    admin: bool,
    routes: Vec<RecordId>,
    config: SyncConfig,
    remote: Option<Arc<MemoryRemoteStore>>,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self {
            tenant: TEST_TENANT.into(),
            user: TEST_USER.into(),
            admin: false,
            routes: Vec::new(),
            config: SyncConfig::default(),
            remote: None,
        }
    }
}

impl TestEnvBuilder {
    /// Sets the tenant.
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    /// Sets the user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Grants every route.
    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }

    /// Sets the accessible routes.
    pub fn routes(mut self, routes: &[i64]) -> Self {
        self.routes = routes.iter().copied().map(RecordId::new).collect();
        self
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a remote store with another environment.
    pub fn remote(mut self, remote: Arc<MemoryRemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Builds the environment.
    pub fn build(self) -> TestEnv {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = self.remote.unwrap_or_default();
        let metadata = Arc::new(MemoryMetadataStore::new());
        let queue = Arc::new(MemoryMutationQueue::new());
        let session = Arc::new(
            StaticSession::new(self.tenant.clone(), self.user)
                .with_admin(self.admin)
                .with_routes(self.routes),
        );
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(TEST_START)));
        let probe = Arc::new(StaticProbe::new(true));

        let ctx = SyncContext::new(
            local.clone(),
            remote.clone(),
            metadata.clone(),
            queue.clone(),
            session.clone(),
        )
        .with_clock(clock.clone())
        .with_network(probe.clone())
        .with_config(self.config);
        let orchestrator =
            SyncOrchestrator::with_standard_handlers(ctx).expect("test configuration is valid");

        TestEnv {
            local,
            remote,
            metadata,
            queue,
            session,
            clock,
            probe,
            orchestrator,
            tenant: self.tenant,
        }
    }
}

impl TestEnv {
    /// Starts a builder.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::default()
    }

    /// Administrator of the default tenant.
    pub fn admin() -> Self {
        Self::builder().admin().build()
    }

    /// Non-admin user of the default tenant with access to `routes`.
    pub fn with_routes(routes: &[i64]) -> Self {
        Self::builder().routes(routes).build()
    }

    /// Context shared by the orchestrator.
    pub fn ctx(&self) -> &SyncContext {
        self.orchestrator.context()
    }

    /// Remote collection of a kind for this tenant.
    ///
    /// Panics if the environment was built with an invalid tenant id.
    pub fn collection(&self, kind: EntityKind) -> CollectionPath {
        let tenant = TenantId::new(self.tenant.as_str()).expect("test tenant is valid");
        collection_reference(&tenant, kind.collection_name()).expect("kind names are valid")
    }

    /// Stores the remote document of `record`.
    pub fn seed_remote(&self, record: &Record) {
        self.remote
            .insert(&self.collection(record.kind), record_to_document(record));
    }

    /// Stores a raw remote document.
    pub fn seed_document(&self, kind: EntityKind, document: Document) {
        self.remote.insert(&self.collection(kind), document);
    }

    /// Stores a local record.
    pub fn seed_local(&self, record: Record) {
        use fieldsync_core::LocalStore;
        self.local.upsert(record).expect("memory store accepts writes");
    }

    /// Local record by id.
    pub fn local_record(&self, kind: EntityKind, id: i64) -> Option<Record> {
        use fieldsync_core::LocalStore;
        self.local
            .get(kind, RecordId::new(id))
            .expect("memory store reads succeed")
    }

    /// Remote documents of a kind.
    pub fn remote_docs(&self, kind: EntityKind) -> Vec<Document> {
        self.remote.documents(&self.collection(kind))
    }

    /// Stored watermark of a scope.
    pub fn watermark(&self, scope: SyncScope) -> Option<Timestamp> {
        self.orchestrator
            .get_last_sync_timestamp(scope)
            .expect("session is valid")
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: i64) {
        self.clock.advance(millis);
    }
}

/// Record with no fields.
pub fn record(kind: EntityKind, id: i64, last_modified: i64) -> Record {
    Record::new(kind, RecordId::new(id), Timestamp::from_millis(last_modified))
}

/// Route record.
pub fn route(id: i64, name: &str, last_modified: i64) -> Record {
    record(EntityKind::Route, id, last_modified).with_field("name", name)
}

/// Client on a route.
pub fn client(id: i64, name: &str, route_id: i64, last_modified: i64) -> Record {
    record(EntityKind::Client, id, last_modified)
        .with_field("name", name)
        .with_field("route_id", route_id)
}

/// Rental table placed at a client.
pub fn table(id: i64, number: &str, client_id: i64, last_modified: i64) -> Record {
    record(EntityKind::Table, id, last_modified)
        .with_field("number", number)
        .with_field("client_id", client_id)
}

/// Settlement of a client on a route.
pub fn settlement(id: i64, client_id: i64, route_id: i64, last_modified: i64) -> Record {
    record(EntityKind::Settlement, id, last_modified)
        .with_field("client_id", client_id)
        .with_field("route_id", route_id)
        .with_field("amount", 100)
}

/// Employee with an email.
pub fn employee(id: i64, email: &str, last_modified: i64) -> Record {
    record(EntityKind::Employee, id, last_modified).with_field("email", email)
}

/// Route assignment of an employee.
pub fn employee_route(id: i64, employee_id: i64, route_id: i64, last_modified: i64) -> Record {
    record(EntityKind::EmployeeRoute, id, last_modified)
        .with_field("employee_id", employee_id)
        .with_field("route_id", route_id)
}

/// Vehicle with no natural key set.
pub fn vehicle(id: i64, last_modified: i64) -> Record {
    record(EntityKind::Vehicle, id, last_modified).with_field("model", format!("van {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_wires_session() {
        let env = TestEnv::builder().tenant("north").user("7").routes(&[3]).build();
        assert_eq!(env.ctx().tenant().unwrap().as_str(), "north");
        assert_eq!(env.ctx().user().unwrap().as_str(), "7");
        assert_eq!(env.collection(EntityKind::Client).tenant().as_str(), "north");
    }

    #[test]
    fn seeded_documents_are_visible() {
        let env = TestEnv::admin();
        env.seed_remote(&client(1, "Ana", 10, 5));
        let docs = env.remote_docs(EntityKind::Client);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_i64("route_id"), Some(10));
    }
}
