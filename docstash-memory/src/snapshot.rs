//! Whole-store JSON snapshots.
//!
//! The snapshot is a single JSON object mapping each collection name to the list
//! of its documents in collection order. Identifiers are written as their
//! canonical hex strings and dates as epoch milliseconds. Every write replaces the
//! previous file entirely: the image goes to a fresh sibling file which is then
//! renamed over the snapshot, so readers only ever see a complete image.
//!
//! JSON carries no integer width. Integers that fit in 32 bits reload as
//! `Int32` and larger ones as `Int64`, so a reloaded `Int64(5)` compares equal to
//! the original under filter equality but not under `Document` equality.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use bson::{Bson, Document, oid::ObjectId};
use serde_json::{Map, Number as JsonNumber, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use docstash_core::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    value::Number,
};

/// In-memory image of every collection, keyed by name.
pub(crate) type Collections = BTreeMap<String, Vec<Document>>;

/// Converts a value to its snapshot representation.
pub(crate) fn to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(value) => Value::Bool(*value),
        Bson::Int32(value) => Value::from(*value),
        Bson::Int64(value) => Value::from(*value),
        Bson::Double(value) => JsonNumber::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(value) => Value::String(value.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(date) => Value::from(date.timestamp_millis()),
        Bson::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        Bson::Document(document) => Value::Object(document_to_json(document)),
        other => Value::String(other.to_string()),
    }
}

fn document_to_json(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), to_json(value)))
        .collect()
}

/// Converts a snapshot value back into a document value.
///
/// Integers that fit in 32 bits come back as 32-bit integers.
pub(crate) fn from_json(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(value) => Bson::Boolean(*value),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Number::Int(integer).into_bson(),
            None => Bson::Double(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(value) => Bson::String(value.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(from_json).collect()),
        Value::Object(map) => Bson::Document(document_from_json(map)),
    }
}

fn document_from_json(map: &Map<String, Value>) -> Document {
    let mut document = Document::new();
    for (key, value) in map {
        document.insert(key.clone(), from_json(value));
    }
    document
}

/// Serializes every collection into snapshot bytes.
pub(crate) fn encode(collections: &Collections) -> DocumentStoreResult<Vec<u8>> {
    let image = collections
        .iter()
        .map(|(name, documents)| {
            (
                name.clone(),
                Value::Array(
                    documents
                        .iter()
                        .map(|document| Value::Object(document_to_json(document)))
                        .collect()
                ),
            )
        })
        .collect::<Map<String, Value>>();

    Ok(serde_json::to_vec_pretty(&Value::Object(image))?)
}

/// Parses snapshot bytes, restoring top-level identifiers to native form.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if the bytes are not a JSON object
/// mapping names to lists of objects.
pub(crate) fn decode(bytes: &[u8]) -> DocumentStoreResult<Collections> {
    let Value::Object(image) = serde_json::from_slice::<Value>(bytes)? else {
        return Err(DocumentStoreError::Serialization("snapshot root is not an object".to_string()));
    };

    let mut collections = Collections::new();

    for (name, documents) in image {
        let Value::Array(documents) = documents else {
            return Err(DocumentStoreError::Serialization(format!("collection {name} is not a list")));
        };

        let documents = documents
            .iter()
            .map(|document| match document {
                Value::Object(map) => Ok(restore_id(document_from_json(map))),
                _ => Err(DocumentStoreError::Serialization(format!("collection {name} holds a non-document"))),
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        collections.insert(name, documents);
    }

    Ok(collections)
}

fn restore_id(mut document: Document) -> Document {
    let restored = match document.get(ID_FIELD) {
        Some(Bson::String(text)) => ObjectId::parse_str(text).ok(),
        _ => None,
    };

    if let Some(oid) = restored {
        document.insert(ID_FIELD, oid);
    }
    document
}

/// Loads the snapshot at `path`.
///
/// A missing file yields an empty image. An unreadable or undecodable file is
/// logged and also yields an empty image.
pub(crate) async fn load(path: &Path) -> Collections {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(target: "docstash::snapshot", path = ?path, "No snapshot found, starting empty");
            return Collections::new();
        }
        Err(err) => {
            warn!(target: "docstash::snapshot", path = ?path, error = %err, "Failed to read snapshot, starting empty");
            return Collections::new();
        }
    };

    match decode(&bytes) {
        Ok(collections) => {
            debug!(
                target: "docstash::snapshot",
                path = ?path,
                collections = collections.len(),
                "Loaded snapshot"
            );
            collections
        }
        Err(err) => {
            warn!(target: "docstash::snapshot", path = ?path, error = %err, "Failed to decode snapshot, starting empty");
            Collections::new()
        }
    }
}

/// Distinguishes temporary files of overlapping writes within this process.
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Sibling of `path` that no other write in flight uses.
fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed),
    ))
}

/// Replaces the snapshot at `path` with `bytes`, creating its directory if needed.
///
/// The bytes are written and synced to a temporary file in the same directory,
/// then renamed over `path`.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Persistence`] if the directory or file cannot be written.
pub(crate) async fn write(path: &Path, bytes: Vec<u8>) -> DocumentStoreResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(path);

    if let Err(err) = replace(&staging, path, &bytes).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(err.into());
    }

    debug!(target: "docstash::snapshot", path = ?path, "Wrote snapshot");
    Ok(())
}

async fn replace(staging: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(staging).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(staging, path).await
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::{DateTime, doc};

    #[test]
    fn encoding_writes_identifiers_and_dates_as_plain_json() {
        let oid = ObjectId::new();
        let mut collections = Collections::new();
        collections.insert(
            "commits".to_string(),
            vec![doc! { "_id": oid, "at": DateTime::from_millis(42), "ratio": f64::NAN }],
        );

        let json: Value = serde_json::from_slice(&encode(&collections).unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "commits": [{ "_id": oid.to_hex(), "at": 42, "ratio": null }] }),
        );
    }

    #[test]
    fn decoding_restores_identifiers_and_nesting() {
        let oid = ObjectId::new();
        let bytes = serde_json::to_vec(&serde_json::json!({
            "repos": [{ "_id": oid.to_hex(), "name": "My Car", "cost": { "parts": 1.5, "labor": 80 }, "tags": ["a"] }],
            "users": [],
        }))
        .unwrap();

        let collections = decode(&bytes).unwrap();

        assert_eq!(
            collections["repos"],
            vec![doc! { "_id": oid, "name": "My Car", "cost": { "parts": 1.5, "labor": 80 }, "tags": ["a"] }],
        );
        assert!(collections["users"].is_empty());
    }

    #[test]
    fn non_hex_identifiers_stay_strings() {
        let collections = decode(br#"{ "repos": [{ "_id": "legacy-1" }] }"#).unwrap();
        assert_eq!(collections["repos"], vec![doc! { "_id": "legacy-1" }]);
    }

    #[test]
    fn malformed_snapshots_are_rejected() {
        assert!(matches!(decode(b"[1, 2]"), Err(DocumentStoreError::Serialization(_))));
        assert!(matches!(decode(br#"{ "repos": 5 }"#), Err(DocumentStoreError::Serialization(_))));
        assert!(matches!(decode(br#"{ "repos": [1] }"#), Err(DocumentStoreError::Serialization(_))));
        assert!(matches!(decode(b"{ not json"), Err(DocumentStoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn load_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();

        assert!(load(&dir.path().join("missing.json")).await.is_empty());

        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, b"{ \"repos\": [ oops").unwrap();
        assert!(load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn write_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docstash.json");

        write(&path, b"{}".to_vec()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn shorter_image_fully_replaces_a_longer_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docstash.json");

        write(&path, br#"{ "repos": [{ "name": "a very long name indeed" }] }"#.to_vec()).await.unwrap();
        write(&path, b"{}".to_vec()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("inside"), b"x").unwrap();

        assert!(matches!(
            write(&path, b"{}".to_vec()).await,
            Err(DocumentStoreError::Persistence(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn integer_width_follows_magnitude_on_reload() {
        let collections = decode(br#"{ "items": [{ "small": 5, "large": 5000000000 }] }"#).unwrap();

        assert_eq!(collections["items"], vec![doc! { "small": 5_i32, "large": 5_000_000_000_i64 }]);
    }
}
