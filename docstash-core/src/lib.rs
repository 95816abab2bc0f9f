//! An embedded document store with a Mongo-style query and aggregation surface.
//!
//! This crate is the core of the docstash project and provides:
//!
//! - **Value model** ([`value`]) - Field paths, numeric coercion and ordering across value kinds
//! - **Documents** ([`document`]) - Identifier handling and document helpers
//! - **Filters** ([`query`]) - Filter documents decoded into expressions, plus a visitor to evaluate them
//! - **Expressions** ([`expression`]) - The small expression language used inside pipeline stages
//! - **Pipelines** ([`pipeline`]) - Aggregation stages decoded from their document form
//! - **Cursors** ([`cursor`]) - Sortable, streamable result sets
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Collections interface** ([`collection`]) - High-level API for interacting with document collections
//! - **Document store** ([`store`]) - Main entry point owning a backend
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docstash_core::store::DocumentStore;
//! use bson::doc;
//!
//! let store = DocumentStore::new(backend);
//! let repos = store.collection("repos");
//!
//! let id = repos.insert_one(doc! { "name": "My Car", "current_mileage": 0 }).await?;
//! repos.update_one(doc! { "_id": id }, doc! { "$set": { "current_mileage": 12000 } }).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docstash_core;

pub mod backend;
pub mod collection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod expression;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod value;
