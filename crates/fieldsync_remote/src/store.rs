//! Remote store interface.

use crate::document::Document;
use crate::error::RemoteResult;
use crate::path::CollectionPath;
use crate::query::Query;
use async_trait::async_trait;

/// A hierarchical document store reached over the network.
///
/// Implementations decide their own timeouts; the engine only reacts to the
/// outcome of each call.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Runs a query and returns one page of results.
    async fn run_query(&self, query: &Query) -> RemoteResult<Vec<Document>>;

    /// Reads one document.
    async fn get_document(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> RemoteResult<Option<Document>>;

    /// Creates or replaces a document. Idempotent.
    async fn set_document(&self, collection: &CollectionPath, document: Document) -> RemoteResult<()>;

    /// Deletes a document, returning whether it existed.
    async fn delete_document(&self, collection: &CollectionPath, id: &str) -> RemoteResult<bool>;
}
