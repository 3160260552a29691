//! # fieldsync remote
//!
//! The remote document store as the sync engine sees it.
//!
//! This crate provides:
//! - [`TenantId`] and [`CollectionPath`], the multi-tenancy boundary
//! - [`Document`] and the [`Query`] builder (equality, in, greater-than,
//!   ordering, limit, start-after cursor)
//! - The async [`RemoteStore`] trait
//! - [`MemoryRemoteStore`], an in-process store with fault injection
//!
//! ## Key Invariants
//!
//! - Every collection path is rooted at a validated tenant id
//! - A [`CollectionPath`] can only be built through [`collection_reference`]
//!   or parsed from a string of the same shape
//! - Query results are ordered by the order field, ties broken by document id

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod memory;
mod path;
mod query;
mod store;

pub use document::Document;
pub use error::{RemoteError, RemoteResult};
pub use memory::{MemoryRemoteStore, RemoteSnapshot, DEFAULT_IN_LIMIT};
pub use path::{collection_reference, CollectionPath, TenantId};
pub use query::{Cursor, Filter, Query};
pub use store::RemoteStore;
