//! Convenient re-exports of commonly used types from docstash.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docstash::prelude::*;
//! ```

pub use docstash_core::{
    collection::Collection,
    cursor::Cursor,
    store::DocumentStore,
    document::{DocumentExt, ID_FIELD},
    backend::{StoreBackend, StoreBackendBuilder, WriteScope},
    query::{QueryVisitor, Expr, Filter, FieldOp, SortDirection, SortKey},
    pipeline::{Pipeline, Stage},
    error::{DocumentStoreError, DocumentStoreResult},
};
pub use docstash_memory::{SnapshotConfig, SnapshotStore};
