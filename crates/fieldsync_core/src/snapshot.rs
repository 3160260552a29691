//! JSON snapshot files for the in-memory stores.

use crate::error::CoreResult;
use crate::metadata::{MemoryMetadataStore, SyncMetadata};
use crate::queue::{MemoryMutationQueue, MutationQueue, QueuedMutation};
use crate::record::Record;
use crate::store::MemoryLocalStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Serializable image of a device's local state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    /// Every local record.
    #[serde(default)]
    pub records: Vec<Record>,
    /// Sync bookkeeping rows.
    #[serde(default)]
    pub metadata: Vec<SyncMetadata>,
    /// Offline write buffer.
    #[serde(default)]
    pub mutations: Vec<QueuedMutation>,
}

impl LocalSnapshot {
    /// Captures the current contents of the in-memory stores.
    pub fn capture(
        store: &MemoryLocalStore,
        metadata: &MemoryMetadataStore,
        queue: &MemoryMutationQueue,
    ) -> CoreResult<Self> {
        Ok(Self {
            records: store.records(),
            metadata: metadata.rows(),
            mutations: queue.list()?,
        })
    }

    /// Rebuilds the in-memory stores.
    pub fn restore(self) -> (MemoryLocalStore, MemoryMetadataStore, MemoryMutationQueue) {
        (
            MemoryLocalStore::with_records(self.records),
            MemoryMetadataStore::with_rows(self.metadata),
            MemoryMutationQueue::with_mutations(self.mutations),
        )
    }

    /// Loads a snapshot; a missing file is an empty snapshot.
    pub fn load(path: &Path) -> CoreResult<Self> {
        Ok(read_json(path)?.unwrap_or_default())
    }

    /// Writes the snapshot atomically.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        write_json_atomic(path, self)
    }
}

/// Reads a JSON file, returning `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes pretty JSON to a sibling temp file, syncs it, then renames it over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataStore, SyncScope};
    use crate::queue::{MutationOperation, NewMutation};
    use crate::store::LocalStore;
    use crate::types::{EntityKind, RecordId, Timestamp, UserId};
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let snapshot = LocalSnapshot::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(snapshot, LocalSnapshot::default());
    }

    #[test]
    fn save_then_load_restores_stores() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.json");

        let store = MemoryLocalStore::new();
        let record = Record::new(EntityKind::Route, RecordId(10), Timestamp(100)).with_field("name", "Norte");
        store.upsert(record.clone()).unwrap();

        let metadata = MemoryMetadataStore::new();
        let mut row = SyncMetadata::empty(SyncScope::Pull(EntityKind::Route), UserId::new("u1"));
        row.last_sync_timestamp = Timestamp(100);
        metadata.put(row).unwrap();

        let queue = MemoryMutationQueue::new();
        queue
            .enqueue(NewMutation::upsert(MutationOperation::Create, &record, Timestamp(100), 3).unwrap())
            .unwrap();

        LocalSnapshot::capture(&store, &metadata, &queue)
            .unwrap()
            .save(&path)
            .unwrap();
        assert!(!dir.path().join("device.json.tmp").exists());

        let (store, metadata, queue) = LocalSnapshot::load(&path).unwrap().restore();
        assert_eq!(store.get(EntityKind::Route, RecordId(10)).unwrap(), Some(record));
        assert_eq!(
            metadata
                .get("routes", &UserId::new("u1"))
                .unwrap()
                .unwrap()
                .last_sync_timestamp,
            Timestamp(100)
        );
        assert_eq!(queue.health().unwrap().pending, 1);
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            LocalSnapshot::load(&path),
            Err(crate::CoreError::Json(_))
        ));
    }
}
