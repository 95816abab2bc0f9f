//! Main docstash crate: an embedded, file-persisted document store.
//!
//! This crate is the primary entry point for users of docstash. It re-exports
//! the core types from the sub-crates and wires the embedded backend up from
//! configuration.
//!
//! # Features
//!
//! - **Schemaless documents** - Plain BSON documents with generated identifiers
//! - **Mongo-style filters** - `$gt`, `$in`, `$regex`, `$or` and friends, over nested paths
//! - **Aggregation pipelines** - Grouping, facets, computed fields, sorting and projection
//! - **Snapshot persistence** - The whole store lives in one JSON file
//!
//! # Quick Start
//!
//! ```ignore
//! use docstash::{prelude::*, bson::{Bson, doc}};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = docstash::open(&SnapshotConfig::new("./data")).await?;
//!
//!     let commits = store.collection("commits");
//!     commits
//!         .insert_one(doc! {
//!             "repo_id": "65f0c0ffee0000000000abcd",
//!             "type": "maintenance",
//!             "title": "更换机油",
//!             "cost": { "parts": 250, "labor": 80 },
//!         })
//!         .await?;
//!
//!     // Latest records first
//!     let recent = commits
//!         .find(doc! { "title": { "$regex": "机油", "$options": "i" } })
//!         .await?
//!         .sort("timestamp", -1)
//!         .to_list(Some(20));
//!
//!     // Spend per record type
//!     let composition = commits
//!         .aggregate(vec![
//!             doc! { "$match": { "repo_id": "65f0c0ffee0000000000abcd" } },
//!             doc! { "$group": {
//!                 "_id": "$type",
//!                 "value": { "$sum": { "$add": ["$cost.parts", "$cost.labor"] } },
//!             } },
//!         ])
//!         .await?
//!         .to_list(None);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - The embedded snapshot-backed store

pub mod prelude;

pub use docstash_core::{backend, collection, cursor, document, error, expression, pipeline, query, store, value};

// Re-export BSON types for convenience
pub use bson;

/// Embedded storage backend implementations.
pub mod memory {
    pub use docstash_memory::{SnapshotConfig, SnapshotStore, SnapshotStoreBuilder};
}

use docstash_core::{backend::StoreBackendBuilder, error::DocumentStoreResult, store::DocumentStore};
use docstash_memory::{SnapshotConfig, SnapshotStore};

/// Opens a store persisted under `config`, loading its snapshot if one exists.
///
/// # Errors
///
/// Returns an error if the backend cannot be built.
pub async fn open(config: &SnapshotConfig) -> DocumentStoreResult<DocumentStore<SnapshotStore>> {
    let backend = SnapshotStore::builder()
        .config(config.clone())
        .build()
        .await?;

    Ok(DocumentStore::new(backend))
}

/// Opens a store in the directory named by `DOCSTASH_DATA_DIR`, or the current
/// directory when it is unset.
pub async fn open_from_env() -> DocumentStoreResult<DocumentStore<SnapshotStore>> {
    open(&SnapshotConfig::from_env()).await
}
