//! # fieldsync engine
//!
//! Offline-first synchronization between a device-local store and a
//! tenant-scoped remote document store.
//!
//! This crate provides:
//! - One profile-driven handler per entity kind (complete and incremental
//!   pulls, route filtering, pagination, push of local changes)
//! - Last-writer-wins conflict resolution with natural-key reconciliation
//! - A referential guard that defers children whose parents are not local yet
//! - Delivery of the offline mutation queue with bounded retries
//! - An orchestrator with a dependency-ordered registry, a state machine,
//!   retry with exponential backoff and a background-sync policy
//!
//! ## Architecture
//!
//! A bidirectional cycle runs in this order:
//! 1. Preflight: connectivity, tenant and user
//! 2. Deliver queued mutations, then push changed rows per kind
//! 3. Pull every kind in dependency order, recording the clock reading taken
//!    before the push as the new watermark
//!
//! Every seam (stores, session, clock, network probe) is a trait object in
//! a [`SyncContext`] built once and passed by reference.
//!
//! ## Key Invariants
//!
//! - Stored watermarks never move backwards
//! - A record is only written when the remote version is strictly newer
//! - Non-admin sessions never store records of routes they cannot access
//! - Connectivity failures write no metadata and consume no retries
//! - Mutations of one record are delivered in enqueue order
//! - Pushed documents carry the push time as `last_modified`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod config;
mod conflict;
mod context;
mod error;
mod handler;
mod mapping;
mod metadata;
mod orchestrator;
mod pager;
mod profile;
mod queue;
mod state;

pub use access::{plan_queries, QueryPlan, RouteAccess};
pub use config::{RetryConfig, SyncConfig};
pub use conflict::{apply_remote, resolve, ApplyOutcome, ConflictResolution};
pub use context::{
    Clock, ManualClock, NetworkProbe, Session, StaticProbe, StaticSession, SyncContext, SystemClock,
};
pub use error::{SyncError, SyncResult};
pub use handler::{
    ensure_entity_exists, route_of, EntityHandler, PullMode, PullOptions, PullReport, PushReport,
    SyncHandler,
};
pub use mapping::{document_to_record, record_to_document, ID_FIELD, MODIFIED_FIELD};
pub use metadata::{
    last_sync_timestamp, record_sync_error, reset_sync_metadata, save_sync_metadata, MetadataUpdate,
};
pub use orchestrator::{HandlerRegistry, SyncOrchestrator, PULL_ORDER};
pub use profile::{EntityProfile, ParentRef, RouteFallback, RouteScope};
pub use queue::{process_queue, QueueReport};
pub use state::{PullCycleReport, PushCycleReport, SyncCycleResult, SyncState, SyncStats};

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
