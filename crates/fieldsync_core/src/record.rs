//! Domain records and natural keys.

use crate::types::{EntityKind, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A domain record as seen by the sync engine.
///
/// The engine never interprets `fields`; it only reads the foreign keys and
/// natural-key fields declared for the record's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity kind.
    pub kind: EntityKind,
    /// Local id.
    pub id: RecordId,
    /// Last modification time, the sole conflict-resolution signal.
    pub last_modified: Timestamp,
    /// Business fields, excluding `id` and `last_modified`.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with no fields.
    pub fn new(kind: EntityKind, id: RecordId, last_modified: Timestamp) -> Self {
        Self {
            kind,
            id,
            last_modified,
            fields: Map::new(),
        }
    }

    /// Adds a field, builder style.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Reads a foreign key field.
    ///
    /// Absent, null, zero and non-numeric values all mean "no reference".
    pub fn reference(&self, field: &str) -> Option<RecordId> {
        let id = match self.fields.get(field)? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        (id != 0).then_some(RecordId(id))
    }

    /// Route this record belongs to, if it carries one.
    ///
    /// A route record belongs to itself.
    pub fn route_id(&self) -> Option<RecordId> {
        match self.kind {
            EntityKind::Route => Some(self.id),
            _ => self.reference(EntityKind::Route.reference_field()),
        }
    }

    /// Natural key of this record, if its kind declares one and every part is present.
    pub fn natural_key(&self) -> Option<NaturalKey> {
        let names = self.kind.natural_key_fields();
        if names.is_empty() {
            return None;
        }
        let parts = names
            .iter()
            .map(|name| self.fields.get(*name).and_then(key_part))
            .collect::<Option<Vec<_>>>()?;
        Some(NaturalKey {
            kind: self.kind,
            parts,
        })
    }
}

fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Business identity of a record, independent of its local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    kind: EntityKind,
    parts: Vec<String>,
}

impl NaturalKey {
    /// Builds a key from parts in the order of [`EntityKind::natural_key_fields`].
    pub fn new<I, S>(kind: EntityKind, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Kind the key belongs to.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Key parts.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.parts.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(id: i64) -> Record {
        Record::new(EntityKind::Client, RecordId(id), Timestamp(1_000))
    }

    #[test]
    fn reference_reads_numbers_and_strings() {
        let r = client(1)
            .with_field("route_id", 10)
            .with_field("cycle_id", "42")
            .with_field("vehicle_id", 0)
            .with_field("goal_id", Value::Null);
        assert_eq!(r.reference("route_id"), Some(RecordId(10)));
        assert_eq!(r.reference("cycle_id"), Some(RecordId(42)));
        assert_eq!(r.reference("vehicle_id"), None);
        assert_eq!(r.reference("goal_id"), None);
        assert_eq!(r.reference("missing"), None);
    }

    #[test]
    fn route_record_belongs_to_itself() {
        let route = Record::new(EntityKind::Route, RecordId(10), Timestamp(5));
        assert_eq!(route.route_id(), Some(RecordId(10)));
        assert_eq!(client(1).with_field("route_id", 20).route_id(), Some(RecordId(20)));
    }

    #[test]
    fn natural_key_requires_every_part() {
        let full = client(100).with_field("name", "X").with_field("route_id", 1);
        let key = full.natural_key().unwrap();
        assert_eq!(key, NaturalKey::new(EntityKind::Client, ["X", "1"]));
        assert_eq!(key.to_string(), "client[X|1]");

        let partial = client(100).with_field("name", "X");
        assert!(partial.natural_key().is_none());
    }

    #[test]
    fn numeric_parts_match_string_parts() {
        let a = client(1).with_field("name", "X").with_field("route_id", 7);
        let b = client(2).with_field("name", "X").with_field("route_id", "7");
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn kinds_without_keys_have_none() {
        let s = Record::new(EntityKind::Settlement, RecordId(1), Timestamp(1))
            .with_field("client_id", 3);
        assert!(s.natural_key().is_none());
    }

    #[test]
    fn serializes_with_fields_object() {
        let r = client(3).with_field("name", "Bar do Zé");
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["kind"], json!("client"));
        assert_eq!(value["id"], json!(3));
        assert_eq!(value["fields"]["name"], json!("Bar do Zé"));
    }
}
