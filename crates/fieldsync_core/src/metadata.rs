//! Sync bookkeeping per (entity type, user).

use crate::error::CoreResult;
use crate::types::{EntityKind, Timestamp, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which watermark a metadata row tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncScope {
    /// Last successful pull of an entity.
    Pull(EntityKind),
    /// Last successful push of an entity.
    Push(EntityKind),
    /// Last completed orchestrated pull cycle.
    Global,
}

impl SyncScope {
    const GLOBAL_KEY: &'static str = "_global_sync";
    const PUSH_SUFFIX: &'static str = "_push";

    /// Persisted `entity_type` key.
    pub fn key(&self) -> String {
        match self {
            SyncScope::Pull(kind) => kind.collection_name().to_string(),
            SyncScope::Push(kind) => format!("{}{}", kind.collection_name(), Self::PUSH_SUFFIX),
            SyncScope::Global => Self::GLOBAL_KEY.to_string(),
        }
    }

    /// Parses a persisted key.
    pub fn parse(key: &str) -> Option<Self> {
        if key == Self::GLOBAL_KEY {
            return Some(SyncScope::Global);
        }
        if let Some(kind) = EntityKind::ALL.into_iter().find(|k| k.collection_name() == key) {
            return Some(SyncScope::Pull(kind));
        }
        let base = key.strip_suffix(Self::PUSH_SUFFIX)?;
        EntityKind::ALL
            .into_iter()
            .find(|k| k.collection_name() == base)
            .map(SyncScope::Push)
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Persisted sync bookkeeping for one (entity type, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Scope key, see [`SyncScope::key`].
    pub entity_type: String,
    /// User the bookkeeping belongs to.
    pub user_id: UserId,
    /// Watermark of the last successful cycle. Never decreases.
    pub last_sync_timestamp: Timestamp,
    /// Records applied or sent by the last cycle.
    pub last_sync_count: u64,
    /// Duration of the last cycle.
    pub last_sync_duration_ms: u64,
    /// Bytes read from the remote store by the last cycle.
    pub bytes_downloaded: u64,
    /// Bytes written to the remote store by the last cycle.
    pub bytes_uploaded: u64,
    /// Error summary of the last cycle, if it was partial.
    pub last_error: Option<String>,
    /// When this row was written.
    pub updated_at: Timestamp,
}

impl SyncMetadata {
    /// Creates an empty row for a scope and user.
    pub fn empty(scope: SyncScope, user_id: UserId) -> Self {
        Self {
            entity_type: scope.key(),
            user_id,
            last_sync_timestamp: Timestamp::ZERO,
            last_sync_count: 0,
            last_sync_duration_ms: 0,
            bytes_downloaded: 0,
            bytes_uploaded: 0,
            last_error: None,
            updated_at: Timestamp::ZERO,
        }
    }

    /// The scope this row tracks, if its key is recognized.
    pub fn scope(&self) -> Option<SyncScope> {
        SyncScope::parse(&self.entity_type)
    }
}

/// Storage for [`SyncMetadata`] rows.
pub trait MetadataStore: Send + Sync {
    /// Reads the row for a key.
    fn get(&self, entity_type: &str, user_id: &UserId) -> CoreResult<Option<SyncMetadata>>;

    /// Inserts or replaces a row.
    fn put(&self, metadata: SyncMetadata) -> CoreResult<()>;

    /// Removes a row, returning whether it existed.
    fn remove(&self, entity_type: &str, user_id: &UserId) -> CoreResult<bool>;

    /// All rows of a user, ordered by key.
    fn list(&self, user_id: &UserId) -> CoreResult<Vec<SyncMetadata>>;
}

/// In-memory metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    rows: RwLock<BTreeMap<(String, UserId), SyncMetadata>>,
}

impl MemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given rows.
    pub fn with_rows(rows: impl IntoIterator<Item = SyncMetadata>) -> Self {
        let store = Self::new();
        {
            let mut map = store.rows.write();
            for row in rows {
                map.insert((row.entity_type.clone(), row.user_id.clone()), row);
            }
        }
        store
    }

    /// Returns a copy of every row, for every user.
    pub fn rows(&self) -> Vec<SyncMetadata> {
        self.rows.read().values().cloned().collect()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, entity_type: &str, user_id: &UserId) -> CoreResult<Option<SyncMetadata>> {
        Ok(self
            .rows
            .read()
            .get(&(entity_type.to_string(), user_id.clone()))
            .cloned())
    }

    fn put(&self, metadata: SyncMetadata) -> CoreResult<()> {
        let key = (metadata.entity_type.clone(), metadata.user_id.clone());
        self.rows.write().insert(key, metadata);
        Ok(())
    }

    fn remove(&self, entity_type: &str, user_id: &UserId) -> CoreResult<bool> {
        Ok(self
            .rows
            .write()
            .remove(&(entity_type.to_string(), user_id.clone()))
            .is_some())
    }

    fn list(&self, user_id: &UserId) -> CoreResult<Vec<SyncMetadata>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| &row.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_keys() {
        assert_eq!(SyncScope::Pull(EntityKind::Client).key(), "clients");
        assert_eq!(SyncScope::Push(EntityKind::Client).key(), "clients_push");
        assert_eq!(SyncScope::Global.key(), "_global_sync");
    }

    #[test]
    fn scope_parse_round_trip() {
        for kind in EntityKind::ALL {
            for scope in [SyncScope::Pull(kind), SyncScope::Push(kind)] {
                assert_eq!(SyncScope::parse(&scope.key()), Some(scope));
            }
        }
        assert_eq!(SyncScope::parse("_global_sync"), Some(SyncScope::Global));
        assert_eq!(SyncScope::parse("unknown_push"), None);
    }

    #[test]
    fn rows_are_per_user() {
        let store = MemoryMetadataStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let mut row = SyncMetadata::empty(SyncScope::Pull(EntityKind::Route), alice.clone());
        row.last_sync_timestamp = Timestamp(5);
        store.put(row).unwrap();

        assert_eq!(
            store.get("routes", &alice).unwrap().unwrap().last_sync_timestamp,
            Timestamp(5)
        );
        assert!(store.get("routes", &bob).unwrap().is_none());
        assert_eq!(store.list(&alice).unwrap().len(), 1);
        assert!(store.list(&bob).unwrap().is_empty());

        assert!(store.remove("routes", &alice).unwrap());
        assert!(store.get("routes", &alice).unwrap().is_none());
    }
}
