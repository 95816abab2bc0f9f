//! Storage backend abstraction for the document store.
//!
//! The [`StoreBackend`] trait is the seam between the caller-facing API
//! ([`DocumentStore`](crate::store::DocumentStore) and
//! [`Collection`](crate::collection::Collection)) and the component that owns the
//! documents. Filters and pipelines reach the backend already decoded, as
//! [`Expr`] and [`Pipeline`] values.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances

use async_trait::async_trait;
use bson::{Document, oid::ObjectId};
use std::fmt::Debug;

use crate::{error::DocumentStoreResult, pipeline::Pipeline, query::Expr};

/// How many matching documents a write affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// Only the first match in collection order.
    First,
    /// Every match.
    All,
}

/// Abstract interface for document storage backends.
///
/// # Concurrency
///
/// Backends are shared between concurrently running requests. No operation is
/// transactional: a backend that persists state may interleave one request's
/// persistence write with another request's mutation. Implementers document the
/// exact guarantees they give.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Reads never fail for missing documents or collections; they return empty results.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Appends a document to a collection, assigning an identifier if it has none.
    ///
    /// The collection is created if it doesn't exist.
    ///
    /// # Returns
    ///
    /// The identifier of the stored document.
    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<ObjectId>;

    /// Assigns `fields` on matching documents.
    ///
    /// # Returns
    ///
    /// The number of documents updated.
    async fn update_documents(
        &self,
        filter: &Expr,
        fields: Document,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<usize>;

    /// Removes matching documents.
    ///
    /// # Returns
    ///
    /// The number of documents removed.
    async fn delete_documents(
        &self,
        filter: &Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<usize>;

    /// Returns copies of the matching documents in collection order.
    async fn find_documents(
        &self,
        filter: &Expr,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Runs an aggregation pipeline over a point-in-time copy of a collection.
    async fn aggregate_documents(
        &self,
        pipeline: &Pipeline,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Drops a collection and all its documents.
    ///
    /// # Returns
    ///
    /// Whether the collection existed.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<bool>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with persistent storage
    /// should override this to flush their final state.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<ObjectId> {
        (*self)
            .insert_document(document, collection)
            .await
    }

    async fn update_documents(
        &self,
        filter: &Expr,
        fields: Document,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<usize> {
        (*self)
            .update_documents(filter, fields, scope, collection)
            .await
    }

    async fn delete_documents(
        &self,
        filter: &Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<usize> {
        (*self)
            .delete_documents(filter, scope, collection)
            .await
    }

    async fn find_documents(
        &self,
        filter: &Expr,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self)
            .find_documents(filter, collection)
            .await
    }

    async fn aggregate_documents(
        &self,
        pipeline: &Pipeline,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self)
            .aggregate_documents(pipeline, collection)
            .await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (*self).list_collections().await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<bool> {
        (*self).drop_collection(name).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
