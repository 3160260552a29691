//! # fieldsync testkit
//!
//! Test utilities for fieldsync.
//!
//! This crate provides:
//! - [`TestEnv`]: every engine seam backed by an in-memory implementation
//!   with a manual clock, a switchable network probe and a mutable session
//! - Record and document builders for the common entity kinds
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pulls_seeded_clients() {
//!     let env = TestEnv::admin();
//!     env.seed_remote(&client(1, "Ana", 10, 100));
//!     env.orchestrator.sync_pull().await.unwrap();
//!     assert!(env.local_record(EntityKind::Client, 1).is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use fieldsync_core::{EntityKind, Record, RecordId, SyncScope, Timestamp};
}

pub use fixtures::*;
pub use generators::*;
