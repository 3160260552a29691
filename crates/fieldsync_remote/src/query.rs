//! Query builder and evaluation rules.

use crate::document::Document;
use crate::path::CollectionPath;
use serde_json::Value;
use std::cmp::Ordering;

/// A single filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`.
    Equal {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// `field` equals any of `values`.
    In {
        /// Field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// `field > value` on an integer field.
    GreaterThan {
        /// Field name.
        field: String,
        /// Exclusive lower bound.
        value: i64,
    },
}

impl Filter {
    /// Returns true if the document satisfies this clause.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Equal { field, value } => doc.get(field).is_some_and(|v| values_equal(v, value)),
            Filter::In { field, values } => doc
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| values_equal(v, candidate))),
            Filter::GreaterThan { field, value } => doc.get_i64(field).is_some_and(|v| v > *value),
        }
    }
}

/// Position of the last document of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// Value of the order field on that document.
    pub order_value: Value,
    /// Its document id.
    pub document_id: String,
}

impl Cursor {
    /// Cursor positioned on `doc` for a query ordered by `order_by`.
    pub fn after(doc: &Document, order_by: Option<&str>) -> Self {
        Self {
            order_value: order_by
                .and_then(|field| doc.get(field).cloned())
                .unwrap_or(Value::Null),
            document_id: doc.id.clone(),
        }
    }
}

/// A query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<Filter>,
    order_by: Option<String>,
    limit: Option<usize>,
    start_after: Option<Cursor>,
}

impl Query {
    /// Starts a query over a collection.
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn where_equal(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Equal {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a membership filter.
    #[must_use]
    pub fn where_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.push(Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds a strict lower bound on an integer field.
    #[must_use]
    pub fn where_greater_than(mut self, field: impl Into<String>, value: i64) -> Self {
        self.filters.push(Filter::GreaterThan {
            field: field.into(),
            value,
        });
        self
    }

    /// Orders results by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Resumes after a cursor.
    #[must_use]
    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    /// Target collection.
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Filter clauses.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Order field.
    pub fn order_field(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Result cap.
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Resume cursor.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.start_after.as_ref()
    }

    /// Returns true if the query has a greater-than clause.
    pub fn is_incremental(&self) -> bool {
        self.filters
            .iter()
            .any(|f| matches!(f, Filter::GreaterThan { .. }))
    }

    /// Applies filters, ordering, cursor and limit to a set of documents.
    pub fn evaluate<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched: Vec<&Document> = docs
            .into_iter()
            .filter(|doc| self.filters.iter().all(|f| f.matches(doc)))
            .collect();
        matched.sort_by(|a, b| self.compare(a, b));

        let start = match &self.start_after {
            Some(cursor) => matched
                .iter()
                .position(|doc| self.compare_to_cursor(doc, cursor) == Ordering::Greater)
                .unwrap_or(matched.len()),
            None => 0,
        };
        let end = self
            .limit
            .map_or(matched.len(), |n| start.saturating_add(n).min(matched.len()));
        matched[start..end].iter().map(|doc| (*doc).clone()).collect()
    }

    fn order_value<'d>(&self, doc: &'d Document) -> Option<&'d Value> {
        self.order_by.as_deref().and_then(|field| doc.get(field))
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        compare_values(self.order_value(a), self.order_value(b)).then_with(|| a.id.cmp(&b.id))
    }

    fn compare_to_cursor(&self, doc: &Document, cursor: &Cursor) -> Ordering {
        let cursor_value = (!cursor.order_value.is_null()).then_some(&cursor.order_value);
        compare_values(self.order_value(doc), cursor_value)
            .then_with(|| doc.id.as_str().cmp(cursor.document_id.as_str()))
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over field values: missing first, then by type, then by value.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{collection_reference, TenantId};

    fn path() -> CollectionPath {
        collection_reference(&TenantId::new("t").unwrap(), "clients").unwrap()
    }

    fn doc(id: &str, route: i64, lm: i64) -> Document {
        Document::new(id).with_field("route_id", route).with_field("last_modified", lm)
    }

    #[test]
    fn filters_match_numbers_loosely() {
        let d = doc("1", 10, 500);
        assert!(Filter::Equal { field: "route_id".into(), value: Value::from(10.0) }.matches(&d));
        assert!(Filter::In { field: "route_id".into(), values: vec![5.into(), 10.into()] }.matches(&d));
        assert!(!Filter::In { field: "route_id".into(), values: vec![] }.matches(&d));
        assert!(Filter::GreaterThan { field: "last_modified".into(), value: 499 }.matches(&d));
        assert!(!Filter::GreaterThan { field: "last_modified".into(), value: 500 }.matches(&d));
        assert!(!Filter::GreaterThan { field: "missing".into(), value: 0 }.matches(&d));
    }

    #[test]
    fn ordering_breaks_ties_by_id() {
        let docs = [doc("b", 1, 5), doc("a", 1, 5), doc("c", 1, 1)];
        let result = Query::new(path()).order_by("last_modified").evaluate(&docs);
        let ids: Vec<_> = result.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn cursor_resumes_after_position() {
        let docs: Vec<_> = (0..5).map(|i| doc(&format!("{i}"), 1, 100)).collect();
        let first = Query::new(path()).order_by("last_modified").limit(2).evaluate(&docs);
        assert_eq!(first.len(), 2);

        let cursor = Cursor::after(&first[1], Some("last_modified"));
        let second = Query::new(path())
            .order_by("last_modified")
            .limit(2)
            .start_after(cursor)
            .evaluate(&docs);
        let ids: Vec<_> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn unordered_queries_page_by_id() {
        let docs = [doc("3", 1, 0), doc("1", 1, 0), doc("2", 1, 0)];
        let cursor = Cursor::after(&Document::new("1"), None);
        let rest = Query::new(path()).start_after(cursor).evaluate(&docs);
        let ids: Vec<_> = rest.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn incremental_detection() {
        assert!(!Query::new(path()).order_by("last_modified").is_incremental());
        assert!(Query::new(path()).where_greater_than("last_modified", 1).is_incremental());
    }
}
