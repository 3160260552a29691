//! CLI command implementations.

pub mod pull;
pub mod push;
pub mod queue;
pub mod reset;
pub mod status;
pub mod sync;

use fieldsync_core::{
    read_json, write_json_atomic, LocalSnapshot, MemoryLocalStore, MemoryMetadataStore,
    MemoryMutationQueue, RecordId,
};
use fieldsync_engine::{StaticProbe, StaticSession, SyncContext, SyncOrchestrator};
use fieldsync_remote::{MemoryRemoteStore, RemoteSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type shared by the commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Session flags from the command line.
#[derive(Debug, Clone)]
pub struct SessionArgs {
    /// Tenant id.
    pub tenant: String,
    /// User id.
    pub user: String,
    /// Whether every route is accessible.
    pub admin: bool,
    /// Accessible route ids for non-admin users.
    pub routes: Vec<i64>,
    /// Whether the network probe reports connectivity.
    pub online: bool,
}

/// Stores loaded from snapshot files plus an orchestrator over them.
pub struct Workspace {
    local_path: PathBuf,
    remote_path: PathBuf,
    local: Arc<MemoryLocalStore>,
    metadata: Arc<MemoryMetadataStore>,
    queue: Arc<MemoryMutationQueue>,
    remote: Arc<MemoryRemoteStore>,
    orchestrator: SyncOrchestrator,
}

impl Workspace {
    /// Loads both snapshots; missing files start empty.
    pub fn open(
        local_path: &Path,
        remote_path: &Path,
        session: &SessionArgs,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (local, metadata, queue) = LocalSnapshot::load(local_path)?.restore();
        let local = Arc::new(local);
        let metadata = Arc::new(metadata);
        let queue = Arc::new(queue);

        let remote_snapshot: RemoteSnapshot = read_json(remote_path)?.unwrap_or_default();
        let remote = Arc::new(MemoryRemoteStore::from_snapshot(remote_snapshot)?);

        let static_session = StaticSession::new(session.tenant.clone(), session.user.clone())
            .with_admin(session.admin)
            .with_routes(session.routes.iter().copied().map(RecordId::new));

        let ctx = SyncContext::new(
            local.clone(),
            remote.clone(),
            metadata.clone(),
            queue.clone(),
            Arc::new(static_session),
        )
        .with_network(Arc::new(StaticProbe::new(session.online)));
        let orchestrator = SyncOrchestrator::with_standard_handlers(ctx)?;

        tracing::debug!(
            local = %local_path.display(),
            remote = %remote_path.display(),
            records = local.records().len(),
            "workspace loaded"
        );

        Ok(Self {
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_path_buf(),
            local,
            metadata,
            queue,
            remote,
            orchestrator,
        })
    }

    /// The orchestrator over the loaded stores.
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Local metadata rows.
    pub fn metadata(&self) -> &MemoryMetadataStore {
        &self.metadata
    }

    /// Local mutation queue.
    pub fn queue(&self) -> &MemoryMutationQueue {
        &self.queue
    }

    /// Rewrites both snapshot files atomically.
    pub fn save(&self) -> CommandResult {
        LocalSnapshot::capture(&self.local, &self.metadata, &self.queue)?.save(&self.local_path)?;
        write_json_atomic(&self.remote_path, &self.remote.snapshot())?;
        Ok(())
    }
}
