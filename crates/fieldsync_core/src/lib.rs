//! # fieldsync core
//!
//! Domain model and local bookkeeping for the fieldsync engine.
//!
//! This crate provides:
//! - Entity kinds, record ids, timestamps and natural keys
//! - The [`LocalStore`] interface consumed by the sync engine
//! - Per-entity, per-user [`SyncMetadata`] and its store
//! - The offline [`MutationQueue`] of locally buffered writes
//! - In-memory implementations of all three stores
//! - JSON snapshot files for persisting the in-memory stores
//!
//! ## Key Invariants
//!
//! - `last_modified` is the only conflict-resolution signal a record carries
//! - Mutation status values form a closed set with an explicit lifecycle
//! - Natural keys are used for reconciliation only, never as identity

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod metadata;
mod queue;
mod record;
mod snapshot;
mod store;
mod types;

pub use error::{CoreError, CoreResult};
pub use metadata::{MemoryMetadataStore, MetadataStore, SyncMetadata, SyncScope};
pub use queue::{
    MemoryMutationQueue, MutationId, MutationOperation, MutationQueue, MutationStatus,
    NewMutation, QueueHealth, QueuedMutation,
};
pub use record::{NaturalKey, Record};
pub use snapshot::{read_json, write_json_atomic, LocalSnapshot};
pub use store::{LocalStore, MemoryLocalStore};
pub use types::{EntityKind, RecordId, Timestamp, UserId};
