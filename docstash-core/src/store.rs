//! Main document store interface.
//!
//! [`DocumentStore`] owns a backend and hands out [`Collection`] handles borrowing
//! it. One store is constructed when the service starts and shared by every
//! request handler.
//!
//! # Example
//!
//! ```ignore
//! use docstash::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let repos = store.collection("repos");
//! ```

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Gets a collection with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the collection
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// Lists all collections in the store.
    ///
    /// # Returns
    ///
    /// A vector of collection names in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Drops a collection with the given name.
    ///
    /// # Returns
    ///
    /// Whether the collection existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the change could not be persisted.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<bool> {
        self.backend.drop_collection(name).await
    }

    /// Returns the backend this store was built with.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
