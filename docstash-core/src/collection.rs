//! Named collections of documents.
//!
//! A [`Collection`] is a cheap handle pairing a collection name with a backend
//! reference. It doesn't own any documents; every call goes to the backend.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let commits = store.collection("commits");
//! let id = commits
//!     .insert_one(doc! { "repo_id": repo_id, "type": "maintenance", "mileage": 12000 })
//!     .await?;
//!
//! let latest = commits
//!     .find(doc! { "repo_id": repo_id })
//!     .await?
//!     .sort("timestamp", -1)
//!     .to_list(Some(10));
//! ```

use bson::{Document, oid::ObjectId};

use crate::{
    backend::{StoreBackend, WriteScope},
    cursor::Cursor,
    document::{ID_FIELD, parse_id, set_fields},
    error::DocumentStoreResult,
    pipeline::Pipeline,
    query::{Expr, Filter},
};

/// A handle to a named collection in a storage backend.
///
/// Collections spring into existence on the first insert or update that targets
/// them. Reads against a collection that was never written return empty results.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    /// Creates a new collection reference (internal use).
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds every document matching `filter`, in collection order.
    ///
    /// The returned cursor holds copies; later mutations are not observed through it.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the backend fails.
    pub async fn find(&self, filter: impl Into<Expr>) -> DocumentStoreResult<Cursor> {
        Ok(Cursor::new(
            self.backend
                .find_documents(&filter.into(), self.name())
                .await?
        ))
    }

    /// Returns every document in the collection.
    pub async fn find_all(&self) -> DocumentStoreResult<Cursor> {
        self.find(Expr::all()).await
    }

    /// Returns the first document matching `filter`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the backend fails.
    pub async fn find_one(&self, filter: impl Into<Expr>) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .find(filter)
            .await?
            .into_iter()
            .next())
    }

    /// Looks a document up by the canonical string form of its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::MalformedIdentifier`](crate::error::DocumentStoreError::MalformedIdentifier)
    /// if `id` is not a valid identifier.
    pub async fn find_by_id(&self, id: &str) -> DocumentStoreResult<Option<Document>> {
        let id = parse_id(id)?;

        self.find_one(Filter::eq(ID_FIELD, id)).await
    }

    /// Counts the documents matching `filter`.
    pub async fn count(&self, filter: impl Into<Expr>) -> DocumentStoreResult<usize> {
        Ok(self.find(filter).await?.len())
    }

    /// Appends a document to the collection.
    ///
    /// A missing identifier is generated; a supplied one may be native or its
    /// string form.
    ///
    /// # Returns
    ///
    /// The identifier of the inserted document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if the identifier is already used or was retired by a delete, and
    /// [`DocumentStoreError::Persistence`](crate::error::DocumentStoreError::Persistence)
    /// if the snapshot write fails after the insert was applied.
    pub async fn insert_one(&self, document: Document) -> DocumentStoreResult<ObjectId> {
        Ok(self
            .backend
            .insert_document(document, self.name())
            .await?)
    }

    /// Assigns the fields of `update` on the first matching document.
    ///
    /// `update` is either a bare field map or `{"$set": {...}}`; dotted names
    /// assign nested fields and the identifier field is ignored.
    ///
    /// # Returns
    ///
    /// The number of documents updated, 0 or 1.
    pub async fn update_one(&self, filter: impl Into<Expr>, update: Document) -> DocumentStoreResult<usize> {
        Ok(self
            .backend
            .update_documents(&filter.into(), set_fields(update), WriteScope::First, self.name())
            .await?)
    }

    /// Assigns the fields of `update` on every matching document.
    ///
    /// # Returns
    ///
    /// The number of documents updated.
    pub async fn update_many(&self, filter: impl Into<Expr>, update: Document) -> DocumentStoreResult<usize> {
        Ok(self
            .backend
            .update_documents(&filter.into(), set_fields(update), WriteScope::All, self.name())
            .await?)
    }

    /// Removes the first matching document.
    ///
    /// # Returns
    ///
    /// The number of documents removed, 0 or 1.
    pub async fn delete_one(&self, filter: impl Into<Expr>) -> DocumentStoreResult<usize> {
        Ok(self
            .backend
            .delete_documents(&filter.into(), WriteScope::First, self.name())
            .await?)
    }

    /// Removes every matching document.
    ///
    /// # Returns
    ///
    /// The number of documents removed.
    pub async fn delete_many(&self, filter: impl Into<Expr>) -> DocumentStoreResult<usize> {
        Ok(self
            .backend
            .delete_documents(&filter.into(), WriteScope::All, self.name())
            .await?)
    }

    /// Runs an aggregation pipeline over a point-in-time copy of the collection.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let totals = commits
    ///     .aggregate(vec![
    ///         doc! { "$match": { "repo_id": repo_id } },
    ///         doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$cost.parts" } } },
    ///     ])
    ///     .await?
    ///     .to_list(None);
    /// ```
    pub async fn aggregate(&self, pipeline: impl Into<Pipeline>) -> DocumentStoreResult<Cursor> {
        Ok(Cursor::new(
            self.backend
                .aggregate_documents(&pipeline.into(), self.name())
                .await?
        ))
    }
}
