//! In-process remote store.

use crate::document::Document;
use crate::error::{RemoteError, RemoteResult};
use crate::path::CollectionPath;
use crate::query::{Filter, Query};
use crate::store::RemoteStore;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Maximum number of values accepted by an `in` filter.
pub const DEFAULT_IN_LIMIT: usize = 10;

#[derive(Debug, Default)]
struct Faults {
    queries: HashMap<String, RemoteError>,
    incremental: HashMap<String, RemoteError>,
    writes: HashMap<(String, String), RemoteError>,
}

/// Serializable image of a [`MemoryRemoteStore`], keyed by rendered collection path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Documents per collection path.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Document>>,
}

/// A remote store held in memory.
///
/// Enforces the same query limits as the hosted store and supports injected
/// faults, an offline switch and call accounting for tests.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    collections: RwLock<BTreeMap<CollectionPath, BTreeMap<String, Document>>>,
    online: AtomicBool,
    in_limit: usize,
    faults: Mutex<Faults>,
    query_log: Mutex<Vec<Query>>,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Creates an empty, online store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            online: AtomicBool::new(true),
            in_limit: DEFAULT_IN_LIMIT,
            faults: Mutex::new(Faults::default()),
            query_log: Mutex::new(Vec::new()),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(snapshot: RemoteSnapshot) -> RemoteResult<Self> {
        let store = Self::new();
        {
            let mut collections = store.collections.write();
            for (path, docs) in snapshot.collections {
                let path = CollectionPath::parse(&path)?;
                let entry = collections.entry(path).or_default();
                for doc in docs {
                    entry.insert(doc.id.clone(), doc);
                }
            }
        }
        Ok(store)
    }

    /// Captures every document.
    pub fn snapshot(&self) -> RemoteSnapshot {
        RemoteSnapshot {
            collections: self
                .collections
                .read()
                .iter()
                .map(|(path, docs)| (path.to_string(), docs.values().cloned().collect()))
                .collect(),
        }
    }

    /// Seeds a document without going through the async interface or counters.
    pub fn insert(&self, collection: &CollectionPath, document: Document) {
        self.collections
            .write()
            .entry(collection.clone())
            .or_default()
            .insert(document.id.clone(), document);
    }

    /// Returns the documents of a collection, ordered by id.
    pub fn documents(&self, collection: &CollectionPath) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Switches connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes every query against an entity collection fail.
    pub fn fail_queries(&self, entity: &str, error: RemoteError) {
        self.faults.lock().queries.insert(entity.to_string(), error);
    }

    /// Makes greater-than queries against an entity collection fail.
    pub fn fail_incremental_queries(&self, entity: &str, error: RemoteError) {
        self.faults
            .lock()
            .incremental
            .insert(entity.to_string(), error);
    }

    /// Makes writes of one document fail.
    pub fn fail_writes(&self, entity: &str, document_id: &str, error: RemoteError) {
        self.faults
            .lock()
            .writes
            .insert((entity.to_string(), document_id.to_string()), error);
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Queries executed so far, in order.
    pub fn query_log(&self) -> Vec<Query> {
        self.query_log.lock().clone()
    }

    /// Number of queries (page fetches) executed.
    pub fn query_count(&self) -> usize {
        self.query_log.lock().len()
    }

    /// Number of successful document writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful document deletes.
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Resets query log and counters.
    pub fn reset_counters(&self) {
        self.query_log.lock().clear();
        self.writes.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory store offline".into()))
        }
    }

    fn validate(&self, query: &Query) -> RemoteResult<()> {
        for filter in query.filters() {
            if let Filter::In { field, values } = filter {
                if values.is_empty() || values.len() > self.in_limit {
                    return Err(RemoteError::InvalidArgument(format!(
                        "'in' filter on {field} needs 1..={} values, got {}",
                        self.in_limit,
                        values.len()
                    )));
                }
            }
        }
        Ok(())
    }

    fn injected_query_fault(&self, query: &Query) -> Option<RemoteError> {
        let faults = self.faults.lock();
        let entity = query.collection().entity();
        faults.queries.get(entity).cloned().or_else(|| {
            query
                .is_incremental()
                .then(|| faults.incremental.get(entity).cloned())
                .flatten()
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn run_query(&self, query: &Query) -> RemoteResult<Vec<Document>> {
        self.check_online()?;
        self.query_log.lock().push(query.clone());
        self.validate(query)?;
        if let Some(err) = self.injected_query_fault(query) {
            return Err(err);
        }

        let collections = self.collections.read();
        let page = collections
            .get(query.collection())
            .map(|docs| query.evaluate(docs.values()))
            .unwrap_or_default();
        tracing::trace!(collection = %query.collection(), returned = page.len(), "memory query");
        Ok(page)
    }

    async fn get_document(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> RemoteResult<Option<Document>> {
        self.check_online()?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set_document(&self, collection: &CollectionPath, document: Document) -> RemoteResult<()> {
        self.check_online()?;
        let key = (collection.entity().to_string(), document.id.clone());
        if let Some(err) = self.faults.lock().writes.get(&key).cloned() {
            return Err(err);
        }
        self.insert(collection, document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_document(&self, collection: &CollectionPath, id: &str) -> RemoteResult<bool> {
        self.check_online()?;
        let key = (collection.entity().to_string(), id.to_string());
        if let Some(err) = self.faults.lock().writes.get(&key).cloned() {
            return Err(err);
        }
        let existed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(existed)
    }
}
