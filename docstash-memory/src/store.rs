//! Embedded storage backend with whole-file snapshot persistence.
//!
//! Collections live in memory behind an async-aware read-write lock. Every
//! mutation that changes something rewrites the snapshot file before returning.

use std::{collections::HashSet, path::PathBuf, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};
use tracing::{debug, info};

use docstash_core::{
    backend::{StoreBackend, StoreBackendBuilder, WriteScope},
    document::{DocumentExt, ID_FIELD, normalize_id},
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::Pipeline,
    query::Expr,
    value::set_path,
};

use crate::{
    aggregate::run_pipeline,
    config::SnapshotConfig,
    evaluator::DocumentEvaluator,
    snapshot::{self, Collections},
};

#[derive(Debug, Default)]
struct StoreState {
    /// collection_name -> documents in insertion order
    collections: Collections,
    /// Identifiers removed during this process lifetime
    retired: HashSet<ObjectId>,
}

impl StoreState {
    /// Name of the collection holding a live document with `id`, in any collection.
    fn holder_of(&self, id: ObjectId) -> Option<&str> {
        self.collections
            .iter()
            .find(|(_, documents)| documents.iter().any(|document| document.id() == Some(id)))
            .map(|(name, _)| name.as_str())
    }
}

/// Thread-safe embedded document storage backend.
///
/// This struct implements the [`StoreBackend`] trait over collections held in
/// memory. When built with a [`SnapshotConfig`], the whole store is loaded from
/// the snapshot file at startup and the file is rewritten after each mutation.
///
/// # Concurrency
///
/// `SnapshotStore` is cloneable and clones share the same state. The lock is held
/// for the in-memory part of an operation only, never while the snapshot is being
/// written, so a mutation is never observed half-applied. Two concurrent writers
/// may finish their snapshot writes in either order: the file then holds the
/// complete image of whichever write completed last, which can predate the other
/// writer's mutation until the next write.
///
/// # Example
///
/// ```ignore
/// use docstash_memory::{SnapshotStore, SnapshotConfig};
/// use docstash_core::{backend::StoreBackendBuilder, store::DocumentStore};
///
/// let backend = SnapshotStore::builder()
///     .config(SnapshotConfig::from_env())
///     .build()
///     .await?;
/// let store = DocumentStore::new(backend);
/// ```
#[derive(Default, Clone, Debug)]
pub struct SnapshotStore {
    state: Arc<RwLock<StoreState>>,
    /// Snapshot file; `None` keeps the store purely in memory
    snapshot_path: Option<Arc<PathBuf>>,
}

impl SnapshotStore {
    /// Creates an empty store that never touches the filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store backed by the snapshot described by `config`, loading it
    /// if present.
    pub async fn open(config: &SnapshotConfig) -> Self {
        let path = config.snapshot_path();
        let collections = snapshot::load(&path).await;

        info!(
            target: "docstash::store",
            path = ?path,
            collections = collections.len(),
            "Opened snapshot store"
        );

        Self {
            state: Arc::new(RwLock::new(StoreState {
                collections,
                retired: HashSet::new(),
            })),
            snapshot_path: Some(Arc::new(path)),
        }
    }

    /// Creates a builder for constructing a `SnapshotStore`.
    pub fn builder() -> SnapshotStoreBuilder {
        SnapshotStoreBuilder::default()
    }

    /// Path of the snapshot file, if this store persists.
    pub fn snapshot_path(&self) -> Option<&PathBuf> {
        self.snapshot_path.as_deref()
    }

    /// Rewrites the snapshot with the current state.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Persistence`] if the file cannot be written.
    pub async fn flush(&self) -> DocumentStoreResult<()> {
        let image = {
            let state = self.state.read().await;
            self.image(&state)?
        };

        self.persist(image).await
    }

    /// Encodes the state if this store persists.
    fn image(&self, state: &StoreState) -> DocumentStoreResult<Option<Vec<u8>>> {
        match self.snapshot_path {
            Some(_) => Ok(Some(snapshot::encode(&state.collections)?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, image: Option<Vec<u8>>) -> DocumentStoreResult<()> {
        match (&self.snapshot_path, image) {
            (Some(path), Some(bytes)) => snapshot::write(path, bytes).await,
            _ => Ok(()),
        }
    }
}

/// Moves the identifier to the front of the document, in native form.
fn with_id(document: Document, id: ObjectId) -> Document {
    let mut stored = Document::new();
    stored.insert(ID_FIELD, id);

    for (key, value) in document {
        if key != ID_FIELD {
            stored.insert(key, value);
        }
    }

    stored
}

#[async_trait]
impl StoreBackend for SnapshotStore {
    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<ObjectId> {
        let id = match document.get(ID_FIELD) {
            None | Some(Bson::Null) => ObjectId::new(),
            Some(value) => normalize_id(value)?,
        };

        let image = {
            let mut state = self.state.write().await;

            if state.retired.contains(&id) {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_hex(), collection.to_string()));
            }

            if let Some(holder) = state.holder_of(id) {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_hex(), holder.to_string()));
            }

            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .push(with_id(document, id));

            self.image(&state)?
        };

        debug!(target: "docstash::store", collection, id = %id, "Inserted document");
        self.persist(image).await?;

        Ok(id)
    }

    async fn update_documents(
        &self,
        filter: &Expr,
        fields: Document,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<usize> {
        let (updated, image) = {
            let mut state = self.state.write().await;
            let Some(documents) = state.collections.get_mut(collection) else {
                return Ok(0);
            };

            let mut updated = 0;
            for document in documents.iter_mut() {
                if !DocumentEvaluator::matches(document, filter) {
                    continue;
                }

                for (key, value) in fields.iter() {
                    set_path(document, key, value.clone());
                }
                updated += 1;

                if scope == WriteScope::First {
                    break;
                }
            }

            match updated {
                0 => (0, None),
                updated => (updated, self.image(&state)?),
            }
        };

        debug!(target: "docstash::store", collection, updated, "Updated documents");
        self.persist(image).await?;

        Ok(updated)
    }

    async fn delete_documents(
        &self,
        filter: &Expr,
        scope: WriteScope,
        collection: &str,
    ) -> DocumentStoreResult<usize> {
        let (removed, image) = {
            let mut state = self.state.write().await;
            let StoreState { collections, retired } = &mut *state;

            let Some(documents) = collections.get_mut(collection) else {
                return Ok(0);
            };

            let mut removed = 0;
            let mut kept = Vec::with_capacity(documents.len());

            for document in std::mem::take(documents) {
                let eligible = scope == WriteScope::All || removed == 0;

                if eligible && DocumentEvaluator::matches(&document, filter) {
                    if let Some(id) = document.id() {
                        retired.insert(id);
                    }
                    removed += 1;
                } else {
                    kept.push(document);
                }
            }

            *documents = kept;

            match removed {
                0 => (0, None),
                removed => (removed, self.image(&state)?),
            }
        };

        debug!(target: "docstash::store", collection, removed, "Deleted documents");
        self.persist(image).await?;

        Ok(removed)
    }

    async fn find_documents(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let state = self.state.read().await;

        Ok(match state.collections.get(collection) {
            Some(documents) => DocumentEvaluator::filter_documents(documents, filter),
            None => Vec::new(),
        })
    }

    async fn aggregate_documents(&self, pipeline: &Pipeline, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let documents = {
            let state = self.state.read().await;
            state
                .collections
                .get(collection)
                .cloned()
                .unwrap_or_default()
        };

        Ok(run_pipeline(pipeline, documents))
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.state
                .read()
                .await
                .collections
                .keys()
                .cloned()
                .collect()
        )
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<bool> {
        let image = {
            let mut state = self.state.write().await;
            let Some(documents) = state.collections.remove(name) else {
                return Ok(false);
            };

            state.retired.extend(documents.iter().filter_map(|document| document.id()));
            self.image(&state)?
        };

        info!(target: "docstash::store", collection = name, "Dropped collection");
        self.persist(image).await?;

        Ok(true)
    }

    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        self.flush().await
    }
}


/// Builder for constructing [`SnapshotStore`] instances.
///
/// Defaults to [`SnapshotConfig::default`], a `docstash.json` snapshot in the
/// current directory.
///
/// # Example
///
/// ```ignore
/// use docstash_memory::SnapshotStore;
/// use docstash_core::backend::StoreBackendBuilder;
///
/// let store = SnapshotStore::builder()
///     .data_dir("/var/lib/maintenance")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotStoreBuilder {
    config: Option<SnapshotConfig>,
}

impl Default for SnapshotStoreBuilder {
    fn default() -> Self {
        Self { config: Some(SnapshotConfig::default()) }
    }
}

impl SnapshotStoreBuilder {
    /// Persists under `data_dir`, keeping the configured file name.
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        let mut config = self.config.unwrap_or_default();
        config.data_dir = data_dir.into();
        self.config = Some(config);
        self
    }

    pub fn config(mut self, config: SnapshotConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Disables persistence entirely.
    pub fn in_memory(mut self) -> Self {
        self.config = None;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for SnapshotStoreBuilder {
    type Backend = SnapshotStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(match self.config {
            Some(config) => SnapshotStore::open(&config).await,
            None => SnapshotStore::new(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docstash_core::query::Filter;

    fn everything() -> Expr {
        Expr::all()
    }

    #[tokio::test]
    async fn insert_assigns_and_normalizes_identifiers() {
        let store = SnapshotStore::new();

        let generated = store.insert_document(doc! { "name": "My Car" }, "repos").await.unwrap();
        let supplied = ObjectId::new();
        let returned = store
            .insert_document(doc! { "name": "Van", "_id": supplied.to_hex() }, "repos")
            .await
            .unwrap();

        assert_ne!(generated, supplied);
        assert_eq!(returned, supplied);

        let documents = store.find_documents(&everything(), "repos").await.unwrap();
        assert_eq!(documents[0], doc! { "_id": generated, "name": "My Car" });
        assert_eq!(documents[1], doc! { "_id": supplied, "name": "Van" });
    }

    #[tokio::test]
    async fn insert_rejects_malformed_and_duplicate_identifiers() {
        let store = SnapshotStore::new();

        assert!(matches!(
            store.insert_document(doc! { "_id": "nope" }, "repos").await,
            Err(DocumentStoreError::MalformedIdentifier(_))
        ));

        let id = store.insert_document(doc! {}, "repos").await.unwrap();
        assert!(matches!(
            store.insert_document(doc! { "_id": id }, "repos").await,
            Err(DocumentStoreError::DocumentAlreadyExists(existing, collection))
                if existing == id.to_hex() && collection == "repos"
        ));
    }

    #[tokio::test]
    async fn identifiers_are_unique_across_collections() {
        let store = SnapshotStore::new();
        let id = ObjectId::new();

        store.insert_document(doc! { "_id": id, "name": "My Car" }, "repos").await.unwrap();

        assert!(matches!(
            store.insert_document(doc! { "_id": id.to_hex() }, "commits").await,
            Err(DocumentStoreError::DocumentAlreadyExists(existing, holder))
                if existing == id.to_hex() && holder == "repos"
        ));
        assert_eq!(store.list_collections().await.unwrap(), vec!["repos"]);
    }

    #[tokio::test]
    async fn deleted_identifiers_are_retired() {
        let store = SnapshotStore::new();
        let id = store.insert_document(doc! { "n": 1 }, "commits").await.unwrap();

        let removed = store
            .delete_documents(&Filter::eq(ID_FIELD, id), WriteScope::First, "commits")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_documents(&Filter::eq(ID_FIELD, id), "commits").await.unwrap().is_empty());

        assert!(matches!(
            store.insert_document(doc! { "_id": id }, "commits").await,
            Err(DocumentStoreError::DocumentAlreadyExists(_, _))
        ));
    }

    #[tokio::test]
    async fn write_scope_limits_updates_and_deletes() {
        let store = SnapshotStore::new();
        for n in 0..3 {
            store.insert_document(doc! { "n": n, "kind": "a" }, "items").await.unwrap();
        }

        let kind_a = Filter::eq("kind", "a");
        assert_eq!(
            store
                .update_documents(&kind_a, doc! { "seen": true }, WriteScope::First, "items")
                .await
                .unwrap(),
            1,
        );
        assert_eq!(
            store.find_documents(&Filter::eq("seen", true), "items").await.unwrap().len(),
            1,
        );
        assert_eq!(
            store
                .update_documents(&kind_a, doc! { "meta.flag": 1 }, WriteScope::All, "items")
                .await
                .unwrap(),
            3,
        );
        assert_eq!(
            store.find_documents(&Filter::eq("meta.flag", 1), "items").await.unwrap().len(),
            3,
        );

        assert_eq!(store.delete_documents(&kind_a, WriteScope::First, "items").await.unwrap(), 1);
        let remaining = store.find_documents(&everything(), "items").await.unwrap();
        assert_eq!(remaining.iter().map(|d| d.get_i32("n").unwrap()).collect::<Vec<_>>(), vec![1, 2]);

        assert_eq!(store.delete_documents(&kind_a, WriteScope::All, "items").await.unwrap(), 2);
        assert_eq!(store.delete_documents(&kind_a, WriteScope::All, "items").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reads_do_not_create_collections() {
        let store = SnapshotStore::new();

        assert!(store.find_documents(&everything(), "ghost").await.unwrap().is_empty());
        assert_eq!(
            store.update_documents(&everything(), doc! { "a": 1 }, WriteScope::All, "ghost").await.unwrap(),
            0,
        );
        assert!(store.list_collections().await.unwrap().is_empty());

        store.insert_document(doc! {}, "b").await.unwrap();
        store.insert_document(doc! {}, "a").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);

        assert!(store.drop_collection("a").await.unwrap());
        assert!(!store.drop_collection("a").await.unwrap());
    }

    #[tokio::test]
    async fn mutations_rewrite_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::builder().data_dir(dir.path()).build().await.unwrap();
        let path = dir.path().join("docstash.json");

        assert!(!path.exists());
        let id = store.insert_document(doc! { "name": "My Car" }, "repos").await.unwrap();

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, serde_json::json!({ "repos": [{ "_id": id.to_hex(), "name": "My Car" }] }));

        let reopened = SnapshotStore::builder().data_dir(dir.path()).build().await.unwrap();
        assert_eq!(
            reopened.find_documents(&Filter::eq(ID_FIELD, id.to_hex()), "repos").await.unwrap(),
            vec![doc! { "_id": id, "name": "My Car" }],
        );
    }

    #[tokio::test]
    async fn in_memory_store_never_writes() {
        let store = SnapshotStore::builder().in_memory().build().await.unwrap();

        store.insert_document(doc! { "a": 1 }, "items").await.unwrap();
        assert!(store.snapshot_path().is_none());
        store.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::builder().data_dir(dir.path()).build().await.unwrap();

        let tasks = (0..16)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_document(doc! { "n": n }, "commits").await })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.find_documents(&everything(), "commits").await.unwrap().len(), 16);

        store.clone().shutdown().await.unwrap();
        let reopened = SnapshotStore::builder().data_dir(dir.path()).build().await.unwrap();
        assert_eq!(reopened.find_documents(&everything(), "commits").await.unwrap().len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn overlapping_writes_leave_a_loadable_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::builder().data_dir(dir.path()).build().await.unwrap();
        let path = dir.path().join("docstash.json");
        let padding = "x".repeat(2048);

        for _ in 0..25 {
            let tasks = (0..8)
                .map(|n| {
                    let store = store.clone();
                    let padding = padding.clone();
                    tokio::spawn(async move {
                        if n % 2 == 0 {
                            store
                                .insert_document(doc! { "n": n, "notes": padding }, "commits")
                                .await
                                .map(|_| ())
                        } else {
                            store
                                .delete_documents(&Expr::all(), WriteScope::All, "commits")
                                .await
                                .map(|_| ())
                        }
                    })
                })
                .collect::<Vec<_>>();

            for task in tasks {
                task.await.unwrap().unwrap();
            }

            let bytes = std::fs::read(&path).unwrap();
            assert!(snapshot::decode(&bytes).is_ok());
        }

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().file_name() != "docstash.json")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn failed_snapshot_write_keeps_the_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = SnapshotStore::builder().data_dir(blocker.join("sub")).build().await.unwrap();

        assert!(matches!(
            store.insert_document(doc! { "name": "My Car" }, "repos").await,
            Err(DocumentStoreError::Persistence(_))
        ));
        let documents = store.find_documents(&everything(), "repos").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].get_str("name").unwrap(), "My Car");

        assert!(matches!(
            store
                .update_documents(&everything(), doc! { "current_mileage": 15000 }, WriteScope::All, "repos")
                .await,
            Err(DocumentStoreError::Persistence(_))
        ));
        assert_eq!(
            store.find_documents(&Filter::eq("current_mileage", 15000), "repos").await.unwrap().len(),
            1,
        );

        assert!(matches!(
            store.delete_documents(&everything(), WriteScope::All, "repos").await,
            Err(DocumentStoreError::Persistence(_))
        ));
        assert!(store.find_documents(&everything(), "repos").await.unwrap().is_empty());
    }
}
