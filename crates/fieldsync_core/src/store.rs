//! Local store interface and in-memory implementation.

use crate::error::CoreResult;
use crate::record::{NaturalKey, Record};
use crate::types::{EntityKind, RecordId, Timestamp};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Local-first record store consumed by the sync engine.
///
/// Every method is a single-row (or single-statement) operation; the engine
/// adds no locking or transactions on top.
pub trait LocalStore: Send + Sync {
    /// Reads a record by id.
    fn get(&self, kind: EntityKind, id: RecordId) -> CoreResult<Option<Record>>;

    /// Finds a record of `key.kind()` with the given natural key.
    fn get_by_natural_key(&self, key: &NaturalKey) -> CoreResult<Option<Record>>;

    /// Inserts or replaces a record.
    fn upsert(&self, record: Record) -> CoreResult<()>;

    /// Deletes a record, returning whether it existed.
    fn delete(&self, kind: EntityKind, id: RecordId) -> CoreResult<bool>;

    /// Records with `last_modified > since`, ordered by `(last_modified, id)`.
    fn query_changed_since(&self, kind: EntityKind, since: Timestamp) -> CoreResult<Vec<Record>>;

    /// Rewrites every reference to `old` (a record of `kind`) so it points at `new`.
    ///
    /// Rewritten records are marked modified at `modified_at` (or later, if
    /// already newer) and returned as stored.
    fn migrate_foreign_keys(
        &self,
        kind: EntityKind,
        old: RecordId,
        new: RecordId,
        modified_at: Timestamp,
    ) -> CoreResult<Vec<Record>>;

    /// Number of records of a kind.
    fn count(&self, kind: EntityKind) -> CoreResult<usize>;

    /// Returns true if a record exists.
    fn exists(&self, kind: EntityKind, id: RecordId) -> CoreResult<bool> {
        Ok(self.get(kind, id)?.is_some())
    }
}

/// An in-memory local store.
///
/// Suitable for tests and for the CLI, which persists it through
/// [`LocalSnapshot`](crate::LocalSnapshot).
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    tables: RwLock<HashMap<EntityKind, BTreeMap<RecordId, Record>>>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given records.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for record in records {
                tables
                    .entry(record.kind)
                    .or_default()
                    .insert(record.id, record);
            }
        }
        store
    }

    /// Returns a copy of every record, ordered by kind then id.
    pub fn records(&self) -> Vec<Record> {
        let tables = self.tables.read();
        let mut out: Vec<Record> = tables
            .values()
            .flat_map(|table| table.values().cloned())
            .collect();
        out.sort_by_key(|r| (r.kind, r.id));
        out
    }

    /// Returns a copy of every record of one kind, ordered by id.
    pub fn records_of(&self, kind: EntityKind) -> Vec<Record> {
        self.tables
            .read()
            .get(&kind)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, kind: EntityKind, id: RecordId) -> CoreResult<Option<Record>> {
        Ok(self
            .tables
            .read()
            .get(&kind)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    fn get_by_natural_key(&self, key: &NaturalKey) -> CoreResult<Option<Record>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(&key.kind()) else {
            return Ok(None);
        };
        Ok(table
            .values()
            .find(|record| record.natural_key().as_ref() == Some(key))
            .cloned())
    }

    fn upsert(&self, record: Record) -> CoreResult<()> {
        self.tables
            .write()
            .entry(record.kind)
            .or_default()
            .insert(record.id, record);
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: RecordId) -> CoreResult<bool> {
        Ok(self
            .tables
            .write()
            .get_mut(&kind)
            .and_then(|table| table.remove(&id))
            .is_some())
    }

    fn query_changed_since(&self, kind: EntityKind, since: Timestamp) -> CoreResult<Vec<Record>> {
        let tables = self.tables.read();
        let mut changed: Vec<Record> = tables
            .get(&kind)
            .map(|table| {
                table
                    .values()
                    .filter(|r| r.last_modified > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        changed.sort_by_key(|r| (r.last_modified, r.id));
        Ok(changed)
    }

    fn migrate_foreign_keys(
        &self,
        kind: EntityKind,
        old: RecordId,
        new: RecordId,
        modified_at: Timestamp,
    ) -> CoreResult<Vec<Record>> {
        if old == new {
            return Ok(Vec::new());
        }
        let field = kind.reference_field();
        let mut tables = self.tables.write();
        let mut rewritten = Vec::new();
        for record in tables.values_mut().flat_map(|table| table.values_mut()) {
            if record.reference(field) == Some(old) {
                record.fields.insert(field.to_string(), Value::from(new.0));
                record.last_modified = modified_at.max(record.last_modified);
                rewritten.push(record.clone());
            }
        }
        tracing::debug!(entity = %kind, %old, %new, rewritten = rewritten.len(), "migrated foreign keys");
        Ok(rewritten)
    }

    fn count(&self, kind: EntityKind) -> CoreResult<usize> {
        Ok(self.tables.read().get(&kind).map_or(0, BTreeMap::len))
    }
}
