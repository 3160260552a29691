//! Conflict resolution and reconciliation of pulled records.
//!
//! Whole-record last-writer-wins on `last_modified`; ties keep the local
//! version. When no local row has the remote id, a local row with the same
//! natural key is treated as the same business record created independently
//! on another device: its references move to the remote id and the remote
//! version replaces it.

use fieldsync_core::{CoreResult, LocalStore, Record, RecordId, Timestamp};

/// Decision for one pulled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Local version is at least as new; leave it for the next push.
    KeepLocal,
    /// Remote version is newer; overwrite local fields.
    AcceptRemote,
    /// No local row with this id.
    Insert,
}

impl ConflictResolution {
    /// Returns a short code for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::KeepLocal => "keep_local",
            ConflictResolution::AcceptRemote => "accept_remote",
            ConflictResolution::Insert => "insert",
        }
    }
}

/// Decides between the local row with the remote id (if any) and the remote record.
pub fn resolve(local: Option<&Record>, remote: &Record) -> ConflictResolution {
    match local {
        None => ConflictResolution::Insert,
        Some(local) if remote.last_modified > local.last_modified => ConflictResolution::AcceptRemote,
        Some(_) => ConflictResolution::KeepLocal,
    }
}

/// What applying a pulled record did to the local store.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// New local row.
    Inserted,
    /// Existing row overwritten.
    Updated,
    /// Duplicate under another id replaced; references migrated.
    Reconciled {
        /// Id the local duplicate had.
        previous_id: RecordId,
        /// Records whose references now point at the remote id.
        migrated: Vec<Record>,
    },
    /// Local version kept.
    Unchanged,
}

impl ApplyOutcome {
    /// Returns true if the local store changed.
    pub fn is_applied(&self) -> bool {
        !matches!(self, ApplyOutcome::Unchanged)
    }
}

/// Applies a pulled record to the local store.
///
/// Records rewritten by a reconciliation are marked modified at `now`.
pub fn apply_remote(store: &dyn LocalStore, remote: Record, now: Timestamp) -> CoreResult<ApplyOutcome> {
    let local = store.get(remote.kind, remote.id)?;
    match resolve(local.as_ref(), &remote) {
        ConflictResolution::KeepLocal => Ok(ApplyOutcome::Unchanged),
        ConflictResolution::AcceptRemote => {
            store.upsert(remote)?;
            Ok(ApplyOutcome::Updated)
        }
        ConflictResolution::Insert => {
            let duplicate = match remote.natural_key() {
                Some(key) => store
                    .get_by_natural_key(&key)?
                    .filter(|existing| existing.id != remote.id),
                None => None,
            };
            let Some(duplicate) = duplicate else {
                store.upsert(remote)?;
                return Ok(ApplyOutcome::Inserted);
            };

            tracing::warn!(
                entity = %remote.kind,
                local_id = %duplicate.id,
                remote_id = %remote.id,
                "reconciling duplicate created on another device"
            );
            let migrated = store.migrate_foreign_keys(remote.kind, duplicate.id, remote.id, now)?;
            store.delete(duplicate.kind, duplicate.id)?;
            store.upsert(remote)?;
            Ok(ApplyOutcome::Reconciled {
                previous_id: duplicate.id,
                migrated,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::{EntityKind, MemoryLocalStore};

    const NOW: Timestamp = Timestamp(9_000);

    fn client(id: i64, lm: i64, name: &str) -> Record {
        Record::new(EntityKind::Client, RecordId::new(id), Timestamp::from_millis(lm))
            .with_field("name", name)
            .with_field("route_id", 1)
    }

    #[test]
    fn newer_remote_overwrites() {
        let store = MemoryLocalStore::with_records([client(1, 1000, "old")]);
        let outcome = apply_remote(&store, client(1, 2000, "new"), NOW).unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);
        let stored = store.get(EntityKind::Client, RecordId::new(1)).unwrap().unwrap();
        assert_eq!(stored.field("name").unwrap(), "new");
    }

    #[test]
    fn newer_or_equal_local_is_kept() {
        let store = MemoryLocalStore::with_records([client(1, 3000, "local")]);
        assert_eq!(
            apply_remote(&store, client(1, 2000, "remote"), NOW).unwrap(),
            ApplyOutcome::Unchanged
        );
        assert_eq!(
            apply_remote(&store, client(1, 3000, "remote"), NOW).unwrap(),
            ApplyOutcome::Unchanged
        );
        let stored = store.get(EntityKind::Client, RecordId::new(1)).unwrap().unwrap();
        assert_eq!(stored.field("name").unwrap(), "local");
    }

    #[test]
    fn duplicate_is_reconciled_onto_remote_id() {
        let table = Record::new(EntityKind::Table, RecordId::new(7), Timestamp::from_millis(1))
            .with_field("client_id", 100);
        let store = MemoryLocalStore::with_records([client(100, 1000, "X"), table]);

        let outcome = apply_remote(&store, client(555, 2000, "X"), NOW).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(store.count(EntityKind::Client).unwrap(), 1);
        assert!(store.get(EntityKind::Client, RecordId::new(555)).unwrap().is_some());
        let table = store.get(EntityKind::Table, RecordId::new(7)).unwrap().unwrap();
        assert_eq!(table.reference("client_id"), Some(RecordId::new(555)));
        assert_eq!(table.last_modified, NOW);
        assert_eq!(
            outcome,
            ApplyOutcome::Reconciled {
                previous_id: RecordId::new(100),
                migrated: vec![table]
            }
        );
    }

    #[test]
    fn unknown_record_is_inserted() {
        let store = MemoryLocalStore::with_records([client(1, 1000, "A")]);
        assert_eq!(
            apply_remote(&store, client(2, 10, "B"), NOW).unwrap(),
            ApplyOutcome::Inserted
        );
        assert_eq!(store.count(EntityKind::Client).unwrap(), 2);
    }

    #[test]
    fn resolve_codes() {
        let local = client(1, 5, "a");
        assert_eq!(resolve(None, &local).as_str(), "insert");
        assert_eq!(resolve(Some(&local), &client(1, 6, "b")).as_str(), "accept_remote");
        assert_eq!(resolve(Some(&local), &client(1, 5, "b")).as_str(), "keep_local");
    }
}
