//! Embedded storage backend for docstash.
//!
//! This crate provides [`SnapshotStore`], an implementation of the `StoreBackend`
//! trait that keeps every collection in memory and persists the whole store as a
//! single JSON snapshot file.
//!
//! # Features
//!
//! - **Filter matching** - Comparison, logical and regex operators over nested paths
//! - **Aggregation** - `$match`, `$facet`, `$group`, `$addFields`, `$sort`, `$project`,
//!   `$limit`, `$skip` and `$count` stages
//! - **Snapshot persistence** - Loaded at startup, rewritten after each mutation
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//!
//! # Quick Start
//!
//! ```ignore
//! use docstash_core::{backend::StoreBackendBuilder, store::DocumentStore};
//! use docstash_memory::SnapshotStore;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = SnapshotStore::builder().data_dir("./data").build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     let repos = store.collection("repos");
//!     let id = repos.insert_one(doc! { "name": "My Car" }).await?;
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docstash_memory;

mod aggregate;
pub mod config;
mod evaluator;
mod expression;
mod snapshot;
pub mod store;

pub use config::SnapshotConfig;
pub use store::{SnapshotStore, SnapshotStoreBuilder};
