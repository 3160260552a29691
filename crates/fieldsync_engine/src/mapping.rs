//! Record ↔ document mapping.
//!
//! Document id is the decimal local id. `id` and `last_modified` travel as
//! ordinary document fields so route filters and incremental queries can use
//! them.

use crate::error::{SyncError, SyncResult};
use fieldsync_core::{EntityKind, Record, RecordId, Timestamp};
use fieldsync_remote::Document;
use serde_json::Value;

/// Field holding the record id inside a document.
pub const ID_FIELD: &str = "id";

/// Field compared by incremental pulls and conflict resolution.
pub const MODIFIED_FIELD: &str = "last_modified";

/// Builds the remote document for a local record.
pub fn record_to_document(record: &Record) -> Document {
    let mut fields = record.fields.clone();
    fields.insert(ID_FIELD.to_string(), Value::from(record.id.as_i64()));
    fields.insert(
        MODIFIED_FIELD.to_string(),
        Value::from(record.last_modified.as_millis()),
    );
    Document {
        id: record.id.to_string(),
        fields,
    }
}

/// Maps a fetched document to a record of `kind`.
///
/// A missing modification time maps to [`Timestamp::ZERO`].
pub fn document_to_record(kind: EntityKind, document: &Document) -> SyncResult<Record> {
    let id: RecordId = document
        .id
        .parse()
        .map_err(|_| SyncError::record(kind, &document.id, "document id is not an integer"))?;
    if let Some(body_id) = document.get_i64(ID_FIELD) {
        if body_id != id.as_i64() {
            return Err(SyncError::record(
                kind,
                &document.id,
                format!("body id {body_id} does not match document id"),
            ));
        }
    }
    let last_modified = document
        .get_i64(MODIFIED_FIELD)
        .map_or(Timestamp::ZERO, Timestamp::from_millis);

    let mut fields = document.fields.clone();
    fields.remove(ID_FIELD);
    fields.remove(MODIFIED_FIELD);
    Ok(Record {
        kind,
        id,
        last_modified,
        fields,
    })
}
