//! Document identifiers and document-level helpers.
//!
//! Documents are plain [`bson::Document`] values. Every stored document carries a
//! unique identifier in the [`ID_FIELD`] field, held natively as an [`ObjectId`]
//! and rendered as its 24-character hex string at every text boundary (snapshot
//! files, request parameters).

use bson::{Bson, Document, oid::ObjectId};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{get_path, set_path, stringify},
};

/// Name of the identifier field carried by every stored document.
pub const ID_FIELD: &str = "_id";

/// Parses the canonical string form of an identifier.
///
/// # Errors
///
/// Returns [`DocumentStoreError::MalformedIdentifier`] if `value` is not a valid
/// 24-character hex identifier.
pub fn parse_id(value: &str) -> DocumentStoreResult<ObjectId> {
    ObjectId::parse_str(value).map_err(|_| DocumentStoreError::MalformedIdentifier(value.to_string()))
}

/// Converts a supplied identifier value into native form.
///
/// Native identifiers pass through and strings are parsed.
///
/// # Errors
///
/// Returns [`DocumentStoreError::MalformedIdentifier`] for unparseable strings and
/// for values of any other kind.
pub fn normalize_id(value: &Bson) -> DocumentStoreResult<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(text) => parse_id(text),
        other => Err(DocumentStoreError::MalformedIdentifier(other.to_string())),
    }
}

/// Returns the canonical string form of an identifier value.
pub fn canonical_id(value: &Bson) -> String {
    stringify(value)
}

/// Extracts the fields to assign from an update request.
///
/// Accepts either a bare field map or one wrapped as `{"$set": {...}}`. The
/// identifier field is dropped since identifiers never change after insert.
pub fn set_fields(update: Document) -> Document {
    let fields = match update.get("$set") {
        Some(Bson::Document(inner)) => inner.clone(),
        _ => update,
    };

    fields
        .into_iter()
        .filter(|(key, _)| key != ID_FIELD && !key.starts_with('$'))
        .collect()
}

/// Extension methods for working with stored documents.
pub trait DocumentExt {
    /// Returns the native identifier of this document, if it has one.
    fn id(&self) -> Option<ObjectId>;

    /// Returns the canonical string form of this document's identifier.
    fn id_string(&self) -> Option<String>;

    /// Resolves a dot-separated path; see [`get_path`].
    fn path(&self, path: &str) -> Option<&Bson>;

    /// Assigns a value at a dot-separated path; see [`set_path`].
    fn set_path(&mut self, path: &str, value: Bson);
}

impl DocumentExt for Document {
    fn id(&self) -> Option<ObjectId> {
        match self.get(ID_FIELD) {
            Some(Bson::ObjectId(oid)) => Some(*oid),
            Some(Bson::String(text)) => ObjectId::parse_str(text).ok(),
            _ => None,
        }
    }

    fn id_string(&self) -> Option<String> {
        self.get(ID_FIELD).map(canonical_id)
    }

    fn path(&self, path: &str) -> Option<&Bson> {
        get_path(self, path)
    }

    fn set_path(&mut self, path: &str, value: Bson) {
        set_path(self, path, value)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn string_identifiers_parse_to_native_form() {
        let oid = ObjectId::new();

        assert_eq!(normalize_id(&Bson::String(oid.to_hex())).unwrap(), oid);
        assert_eq!(normalize_id(&Bson::ObjectId(oid)).unwrap(), oid);
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert!(matches!(
            parse_id("not-an-id"),
            Err(DocumentStoreError::MalformedIdentifier(value)) if value == "not-an-id"
        ));
        assert!(matches!(
            normalize_id(&Bson::Int32(7)),
            Err(DocumentStoreError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn set_fields_unwraps_set_and_drops_identifier() {
        let fields = set_fields(doc! { "$set": { "_id": "x", "current_mileage": 12000 } });
        assert_eq!(fields, doc! { "current_mileage": 12000 });

        let fields = set_fields(doc! { "current_head": "更换机油" });
        assert_eq!(fields, doc! { "current_head": "更换机油" });
    }
}
