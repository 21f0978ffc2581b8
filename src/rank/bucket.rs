use std::collections::HashMap;
use std::sync::Arc;
use crate::core::error::Result;
use crate::core::transaction::Transaction;
use crate::core::types::{Document, Namespace};
use crate::storage::DocumentStore;
use crate::topology::{ChainEntry, TopologyNode};

/// Maps topology nodes to persisted counter documents.
pub struct BucketAccessor<S: DocumentStore> {
    store: Arc<S>,
    namespace: Namespace,
}

impl<S: DocumentStore> BucketAccessor<S> {
    pub fn new(store: Arc<S>, namespace: Namespace) -> Self {
        BucketAccessor { store, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Add `delta` to every field of every entry; buckets are upserted.
    pub async fn increment_chain(&self, chain: &[ChainEntry], delta: i64, tx: Option<&Transaction>) -> Result<()> {
        for entry in chain {
            let deltas: Vec<(String, i64)> = entry.fields.iter().map(|f| (f.name.clone(), delta)).collect();
            self.store
                .upsert_increment(&self.namespace, &entry.document_id, &deltas, tx)
                .await?;
        }
        Ok(())
    }

    /// Fetch all buckets named by `chain` in one round trip, keyed by id.
    pub async fn load_chain(&self, chain: &[ChainEntry], tx: Option<&Transaction>) -> Result<HashMap<String, Document>> {
        let ids: Vec<String> = chain.iter().map(|e| e.document_id.clone()).collect();
        let documents = self.store.find_by_ids(&self.namespace, &ids, tx).await?;
        Ok(documents.into_iter().map(|d| (d.id.clone(), d)).collect())
    }

    pub async fn load_node(&self, node: &TopologyNode, tx: Option<&Transaction>) -> Result<Option<Document>> {
        self.store.find_by_id(&self.namespace, &node.document_id(), tx).await
    }

    pub async fn load(&self, document_id: &str, tx: Option<&Transaction>) -> Result<Option<Document>> {
        self.store.find_by_id(&self.namespace, document_id, tx).await
    }

    /// True when every field of every entry holds a positive count.
    pub fn chain_is_populated(chain: &[ChainEntry], documents: &HashMap<String, Document>) -> bool {
        chain.iter().all(|entry| {
            documents.get(&entry.document_id).is_some_and(|doc| {
                entry.fields.iter().all(|f| doc.get(&f.name) > 0)
            })
        })
    }

    /// Sum of the chain's fields over the loaded buckets; absent counts as zero.
    pub fn sum_chain(chain: &[ChainEntry], documents: &HashMap<String, Document>) -> i64 {
        chain
            .iter()
            .filter_map(|entry| documents.get(&entry.document_id).map(|doc| (entry, doc)))
            .flat_map(|(entry, doc)| entry.fields.iter().map(move |f| doc.get(&f.name)))
            .sum()
    }
}
