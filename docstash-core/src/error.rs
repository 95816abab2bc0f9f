//! Error types and result types for document store operations.
//!
//! This module provides the error taxonomy shared by every layer of the store.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Matching and aggregation never fail: unresolved paths and unsupported stages
//! degrade to defaults. Errors are reserved for rejected requests (malformed or
//! duplicate identifiers) and for snapshot writes that could not complete.

use serde_json::Error as SerdeJsonError;
use std::{convert::Infallible, io::Error as IoError};
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection, or the ID was
    /// retired by an earlier delete.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// A supplied identifier could not be parsed into the canonical identifier form.
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The snapshot could not be written. The in-memory mutation that triggered the
    /// write has already been applied and is not rolled back.
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`DocumentStoreError`].
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<IoError> for DocumentStoreError {
    fn from(err: IoError) -> Self {
        DocumentStoreError::Persistence(err.to_string())
    }
}

impl From<Infallible> for DocumentStoreError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
