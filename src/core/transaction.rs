use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use tracing::debug;
use crate::core::config::TransactionConfig;
use crate::core::error::{Result, Error, ErrorKind};
use crate::core::types::{DocKey, Document};
use crate::storage::DocumentStore;

/// Transaction ID generator
static TRANSACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransactionState {
    Active,
    Preparing,
    Committed,
    Aborted,
}

/// Which observed versions are validated at commit. Written documents are
/// validated at every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

/// Optimistic multi-document transaction.
///
/// Records the version of every document it touches and buffers increments
/// until the store commits it.
pub struct Transaction {
    pub id: u64,
    pub isolation_level: IsolationLevel,
    state: RwLock<TransactionState>,
    observed: RwLock<HashMap<DocKey, u64>>,
    write_set: RwLock<BTreeMap<DocKey, BTreeMap<String, i64>>>,
}

impl Transaction {
    /// Begin new transaction
    pub fn begin(isolation_level: IsolationLevel) -> Self {
        let id = TRANSACTION_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

        Transaction {
            id,
            isolation_level,
            state: RwLock::new(TransactionState::Active),
            observed: RwLock::new(HashMap::new()),
            write_set: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    pub fn check_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::new(ErrorKind::InvalidState, format!("Transaction {} is not active", self.id)));
        }
        Ok(())
    }

    /// Record a read. `existed` tells whether the document was present.
    pub fn record_read(&self, key: &DocKey, version: u64, existed: bool) {
        let track = match self.isolation_level {
            IsolationLevel::ReadCommitted => false,
            IsolationLevel::RepeatableRead => existed,
            IsolationLevel::Serializable => true,
        };
        if track {
            self.observed.write().entry(key.clone()).or_insert(version);
        }
    }

    /// Buffer increments; `version` is the document's version at first touch.
    pub fn record_increment(&self, key: &DocKey, version: u64, deltas: &[(String, i64)]) -> Result<()> {
        self.check_active()?;

        self.observed.write().entry(key.clone()).or_insert(version);

        let mut write_set = self.write_set.write();
        let pending = write_set.entry(key.clone()).or_default();
        for (field, delta) in deltas {
            *pending.entry(field.clone()).or_insert(0) += delta;
        }
        Ok(())
    }

    /// Read-your-own-writes: fold buffered increments into a fetched document.
    pub fn overlay(&self, key: &DocKey, doc: Option<Document>) -> Option<Document> {
        let write_set = self.write_set.read();
        match (write_set.get(key), doc) {
            (Some(deltas), Some(mut doc)) => {
                doc.apply(deltas);
                Some(doc)
            }
            (Some(deltas), None) => {
                let mut doc = Document::new(key.1.clone());
                doc.apply(deltas);
                Some(doc)
            }
            (None, doc) => doc,
        }
    }

    pub fn observed(&self) -> Vec<(DocKey, u64)> {
        self.observed.read().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn writes(&self) -> Vec<(DocKey, BTreeMap<String, i64>)> {
        self.write_set.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Move to `Preparing`; only the store calls this, right before validation.
    pub fn prepare(&self) -> Result<()> {
        let mut state = self.state.write();
        if *state != TransactionState::Active {
            return Err(Error::new(ErrorKind::InvalidState, format!("Transaction {} is not active", self.id)));
        }
        *state = TransactionState::Preparing;
        Ok(())
    }

    pub fn mark_committed(&self) {
        *self.state.write() = TransactionState::Committed;
    }

    /// Abort explicitly. The runner reports the attempt as not committed.
    pub fn abort(&self) {
        *self.state.write() = TransactionState::Aborted;

        // Clear all in-memory state
        self.observed.write().clear();
        self.write_set.write().clear();
    }

    /// Rollback/abort transaction
    pub fn rollback(&self) {
        if self.state() != TransactionState::Committed {
            self.abort();
        }
    }
}

/// Outcome of [`TransactionRunner::start`]
#[derive(Debug, Clone)]
pub struct TransactionResult<T> {
    pub value: T,
    pub committed: bool,
    pub retries: u32,
}

/// Runs a callback in a fresh transaction, retrying on write conflicts.
pub struct TransactionRunner<S: DocumentStore> {
    store: Arc<S>,
    config: TransactionConfig,
}

impl<S: DocumentStore> TransactionRunner<S> {
    pub fn new(store: Arc<S>, config: TransactionConfig) -> Self {
        TransactionRunner { store, config }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub async fn start<T, F, Fut>(&self, mut callback: F) -> Result<TransactionResult<T>>
    where
        F: FnMut(Arc<Transaction>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries: u32 = 0;

        loop {
            let tx = Arc::new(Transaction::begin(self.config.isolation_level));

            let failure = match callback(tx.clone()).await {
                Ok(value) => {
                    if tx.state() == TransactionState::Aborted {
                        return Ok(TransactionResult { value, committed: false, retries });
                    }
                    match self.store.commit(&tx).await {
                        Ok(()) => return Ok(TransactionResult { value, committed: true, retries }),
                        Err(err) => err,
                    }
                }
                Err(err) => err,
            };

            tx.rollback();
            if !failure.is_transient() {
                return Err(failure);
            }

            retries += 1;
            if let Some(max_retry) = self.config.max_retry {
                if retries > max_retry {
                    return Err(Error::new(
                        ErrorKind::TransactionExhausted,
                        format!("Transaction aborted with a retry of {} times.", max_retry),
                    ));
                }
            }

            debug!(tx = tx.id, retries, reason = %failure, "retrying transaction");
            tokio::task::yield_now().await;
        }
    }
}
