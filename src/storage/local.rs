use std::collections::BTreeMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::transaction::Transaction;
use crate::core::types::{DocKey, Document, Namespace};
use crate::storage::checkpoint::{Checkpoint, RecoveryManager};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::wal::{Mutation, WAL};
use crate::storage::{apply_mutation, DocumentStore, StoreState};

/// Durability half of a local store
struct Journal {
    storage: StorageLayout,
    wal: WAL,
    checkpoint_interval: u64,
    since_checkpoint: u64,
    _lock: FileLock,
}

impl Journal {
    /// Checkpoint once enough entries accumulated. `state` must already
    /// include every appended entry.
    fn after_append(&mut self, state: &StoreState) {
        self.since_checkpoint += 1;

        if self.checkpoint_interval > 0 && self.since_checkpoint >= self.checkpoint_interval {
            // The entry is already durable in the WAL; a failed checkpoint
            // only means a longer replay on reopen.
            if let Err(err) = self.checkpoint(state) {
                warn!(error = %err, "automatic checkpoint failed");
            }
        }
    }

    /// `state` must already include every appended entry.
    fn checkpoint(&mut self, state: &StoreState) -> Result<()> {
        let checkpoint = Checkpoint::new(self.wal.sequence, state.clone());
        checkpoint.save(&self.storage)?;

        self.wal.rotate(&self.storage)?;
        let removed = RecoveryManager::truncate_before(&self.storage, checkpoint.wal_sequence)?;
        self.since_checkpoint = 0;

        debug!(
            wal_sequence = checkpoint.wal_sequence,
            documents = checkpoint.doc_count,
            removed,
            "checkpoint written"
        );
        Ok(())
    }
}

/// In-process document store with optimistic transactions.
///
/// Holds every collection in memory. When opened on a directory, each
/// committed batch is journaled to the WAL before it becomes visible, and
/// checkpoints bound the replay on reopen.
pub struct LocalStore {
    state: RwLock<StoreState>,
    journal: Option<Mutex<Journal>>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        LocalStore {
            state: RwLock::new(StoreState::new()),
            journal: None,
        }
    }

    pub fn open(config: &Config) -> Result<Self> {
        let Some(path) = &config.storage_path else {
            return Ok(Self::in_memory());
        };

        let storage = StorageLayout::new(path.clone())?;
        let lock = FileLock::acquire(&storage)?;

        let recovered = RecoveryManager::recover(&storage)?;
        let mut state = recovered
            .checkpoint
            .map(|c| c.state)
            .unwrap_or_default();
        for entry in &recovered.entries {
            for mutation in &entry.mutations {
                apply_mutation(&mut state, mutation);
            }
        }

        // A log file at the next sequence holds no intact entry (empty after a
        // rotation, or a torn first frame); appending behind it would hide
        // every new entry from replay.
        let next_path = storage.wal_path(recovered.next_sequence);
        if next_path.exists() {
            std::fs::remove_file(&next_path)?;
        }
        let wal = WAL::open(&storage, recovered.next_sequence, config.sync_mode)?;
        info!(
            path = %path.display(),
            collections = state.len(),
            next_sequence = recovered.next_sequence,
            "opened local store"
        );

        Ok(LocalStore {
            state: RwLock::new(state),
            journal: Some(Mutex::new(Journal {
                storage,
                wal,
                checkpoint_interval: config.checkpoint_interval,
                since_checkpoint: recovered.entries.len() as u64,
                _lock: lock,
            })),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    /// Write a full checkpoint and drop the log it covers. No-op in memory.
    pub fn checkpoint(&self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };

        // Writers hold the state lock while journaling, so this image is
        // exactly the log up to the current sequence.
        let state = self.state.write();
        journal.lock().checkpoint(&state)
    }

    /// Flush the WAL to disk. No-op in memory.
    pub fn sync(&self) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.lock().wal.sync(),
            None => Ok(()),
        }
    }

    pub fn document_count(&self, namespace: &Namespace) -> usize {
        self.state.read().get(namespace).map_or(0, |docs| docs.len())
    }

    pub fn namespaces(&self) -> Vec<Namespace> {
        self.state.read().keys().cloned().collect()
    }

    fn version_of(state: &StoreState, namespace: &Namespace, id: &str) -> u64 {
        state
            .get(namespace)
            .and_then(|docs| docs.get(id))
            .map_or(0, |doc| doc.version)
    }

    /// Journal then apply, under the caller's write guard.
    fn write(&self, state: &mut StoreState, mutations: Vec<Mutation>) -> Result<()> {
        let Some(journal) = &self.journal else {
            for mutation in &mutations {
                apply_mutation(state, mutation);
            }
            return Ok(());
        };

        let mut journal = journal.lock();
        journal.wal.append(mutations.clone())?;
        for mutation in &mutations {
            apply_mutation(state, mutation);
        }
        journal.after_append(state);
        Ok(())
    }

    fn read(&self, namespace: &Namespace, id: &str, tx: Option<&Transaction>) -> Result<Option<Document>> {
        let (doc, version) = {
            let state = self.state.read();
            match state.get(namespace).and_then(|docs| docs.get(id)) {
                Some(stored) => (Some(stored.to_document(id)), stored.version),
                None => (None, 0),
            }
        };

        match tx {
            Some(tx) => {
                tx.check_active()?;
                let key: DocKey = (namespace.clone(), id.to_string());
                tx.record_read(&key, version, doc.is_some());
                Ok(tx.overlay(&key, doc))
            }
            None => Ok(doc),
        }
    }
}

impl DocumentStore for LocalStore {
    async fn find_by_id(
        &self,
        namespace: &Namespace,
        id: &str,
        tx: Option<&Transaction>,
    ) -> Result<Option<Document>> {
        self.read(namespace, id, tx)
    }

    async fn find_by_ids(
        &self,
        namespace: &Namespace,
        ids: &[String],
        tx: Option<&Transaction>,
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.read(namespace, id, tx)? {
                documents.push(doc);
            }
        }
        Ok(documents)
    }

    async fn upsert_increment(
        &self,
        namespace: &Namespace,
        id: &str,
        deltas: &[(String, i64)],
        tx: Option<&Transaction>,
    ) -> Result<()> {
        if let Some(tx) = tx {
            let version = Self::version_of(&self.state.read(), namespace, id);
            return tx.record_increment(&(namespace.clone(), id.to_string()), version, deltas);
        }

        let mutation = Mutation::Increment {
            namespace: namespace.clone(),
            id: id.to_string(),
            deltas: deltas.iter().fold(BTreeMap::new(), |mut acc, (field, delta)| {
                *acc.entry(field.clone()).or_insert(0) += delta;
                acc
            }),
        };
        let mut state = self.state.write();
        self.write(&mut state, vec![mutation])
    }

    async fn upsert_set_on_insert(
        &self,
        namespace: &Namespace,
        id: &str,
        values: &BTreeMap<String, i64>,
    ) -> Result<Document> {
        let mut state = self.state.write();
        if let Some(existing) = state.get(namespace).and_then(|docs| docs.get(id)) {
            return Ok(existing.to_document(id));
        }

        let mutation = Mutation::SetOnInsert {
            namespace: namespace.clone(),
            id: id.to_string(),
            values: values.clone(),
        };
        self.write(&mut state, vec![mutation])?;

        Ok(Document {
            id: id.to_string(),
            values: values.clone(),
        })
    }

    async fn commit(&self, tx: &Transaction) -> Result<()> {
        tx.prepare()?;

        let observed = tx.observed();
        let writes = tx.writes();

        let mut state = self.state.write();
        for ((namespace, id), version) in &observed {
            let current = Self::version_of(&state, namespace, id);
            if current != *version {
                drop(state);
                tx.abort();
                return Err(Error::new(
                    ErrorKind::WriteConflict,
                    format!("Transaction {} conflicts on {}/{} (version {} != {})", tx.id, namespace, id, version, current),
                ));
            }
        }

        if !writes.is_empty() {
            let mutations = writes
                .into_iter()
                .map(|((namespace, id), deltas)| Mutation::Increment { namespace, id, deltas })
                .collect();
            if let Err(err) = self.write(&mut state, mutations) {
                drop(state);
                tx.abort();
                return Err(err);
            }
        }

        tx.mark_committed();
        Ok(())
    }
}
