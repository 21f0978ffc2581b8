pub mod checkpoint;
pub mod file_lock;
pub mod layout;
pub mod local;
pub mod wal;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::core::transaction::Transaction;
use crate::core::types::{Document, Namespace};

pub use local::LocalStore;

/// A document as held by a store: its counters plus a version bumped on
/// every change. Absent documents have version 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub values: BTreeMap<String, i64>,
    pub version: u64,
}

impl StoredDocument {
    pub fn to_document(&self, id: &str) -> Document {
        Document {
            id: id.to_string(),
            values: self.values.clone(),
        }
    }
}

/// Every collection of a store, keyed by namespace then document id
pub type StoreState = BTreeMap<Namespace, HashMap<String, StoredDocument>>;

/// Capabilities the rank engine consumes from a document store.
///
/// Every single-document write is atomic. Passing a transaction defers
/// writes to [`DocumentStore::commit`] and records what was observed for
/// commit-time validation.
pub trait DocumentStore: Send + Sync + 'static {
    fn find_by_id(
        &self,
        namespace: &Namespace,
        id: &str,
        tx: Option<&Transaction>,
    ) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Documents found among `ids`, in the order of `ids`
    fn find_by_ids(
        &self,
        namespace: &Namespace,
        ids: &[String],
        tx: Option<&Transaction>,
    ) -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// Add `deltas` to the document's fields, creating it if absent.
    fn upsert_increment(
        &self,
        namespace: &Namespace,
        id: &str,
        deltas: &[(String, i64)],
        tx: Option<&Transaction>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert `values` unless the document exists; returns the stored document.
    fn upsert_set_on_insert(
        &self,
        namespace: &Namespace,
        id: &str,
        values: &BTreeMap<String, i64>,
    ) -> impl Future<Output = Result<Document>> + Send;

    /// Validate and apply a transaction's buffered writes atomically.
    fn commit(&self, tx: &Transaction) -> impl Future<Output = Result<()>> + Send;
}

/// Apply one mutation to an in-memory image. Shared by live writes and replay.
pub(crate) fn apply_mutation(state: &mut StoreState, mutation: &wal::Mutation) {
    match mutation {
        wal::Mutation::Increment { namespace, id, deltas } => {
            let doc = state
                .entry(namespace.clone())
                .or_default()
                .entry(id.clone())
                .or_default();
            for (field, delta) in deltas {
                *doc.values.entry(field.clone()).or_insert(0) += delta;
            }
            doc.version += 1;
        }
        wal::Mutation::SetOnInsert { namespace, id, values } => {
            let docs = state.entry(namespace.clone()).or_default();
            docs.entry(id.clone()).or_insert_with(|| StoredDocument {
                values: values.clone(),
                version: 1,
            });
        }
    }
}
