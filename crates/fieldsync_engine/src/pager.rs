//! Cursor pagination over remote queries.

use fieldsync_remote::{Cursor, Document, Query, RemoteResult, RemoteStore};

/// Walks a query page by page until a short page ends it.
pub(crate) struct Pager {
    base: Query,
    page_size: usize,
    cursor: Option<Cursor>,
    done: bool,
    pages: usize,
    bytes: u64,
}

impl Pager {
    pub(crate) fn new(base: Query, page_size: usize) -> Self {
        Self {
            base,
            page_size: page_size.max(1),
            cursor: None,
            done: false,
            pages: 0,
            bytes: 0,
        }
    }

    /// Fetches the next page; `None` once the query is exhausted.
    pub(crate) async fn next_page(
        &mut self,
        remote: &dyn RemoteStore,
    ) -> RemoteResult<Option<Vec<Document>>> {
        if self.done {
            return Ok(None);
        }
        let mut query = self.base.clone().limit(self.page_size);
        if let Some(cursor) = self.cursor.take() {
            query = query.start_after(cursor);
        }
        let page = remote.run_query(&query).await?;
        self.pages += 1;
        self.bytes += page.iter().map(Document::encoded_len).sum::<u64>();
        if page.len() < self.page_size {
            self.done = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(Cursor::after(last, self.base.order_field()));
        }
        tracing::debug!(
            collection = %self.base.collection(),
            page = self.pages,
            returned = page.len(),
            "fetched page"
        );
        Ok((!page.is_empty()).then_some(page))
    }

    /// Pages fetched so far.
    pub(crate) fn pages(&self) -> usize {
        self.pages
    }

    /// Encoded bytes fetched so far.
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }
}
