use std::sync::Arc;
use tracing::info;
use crate::core::config::{Config, RankConfig, TransactionConfig};
use crate::core::error::Result;
use crate::core::transaction::TransactionRunner;
use crate::rank::engine::RankEngine;
use crate::storage::{DocumentStore, LocalStore};

/// A database handle: one store shared by every rank engine opened on it.
pub struct Database<S: DocumentStore = LocalStore> {
    config: Config,
    store: Arc<S>,
}

impl Database<LocalStore> {
    /// Open (or create) the store described by `config`, replaying its log.
    pub fn open(config: Config) -> Result<Self> {
        let store = Arc::new(LocalStore::open(&config)?);
        info!(db = %config.db_name, durable = store.is_durable(), "database opened");
        Ok(Database { config, store })
    }

    pub fn in_memory() -> Self {
        Database {
            config: Config::in_memory(),
            store: Arc::new(LocalStore::in_memory()),
        }
    }

    /// Persist a full image of the store and truncate the log.
    pub fn checkpoint(&self) -> Result<()> {
        self.store.checkpoint()
    }

    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }
}

impl<S: DocumentStore> Database<S> {
    /// Wrap an existing store, e.g. to share one between databases.
    pub fn with_store(config: Config, store: Arc<S>) -> Self {
        Database { config, store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn db_name(&self) -> &str {
        &self.config.db_name
    }

    /// A rank engine over `config.collection_name`, in this database unless
    /// the configuration names another one.
    pub fn rank_engine(&self, mut config: RankConfig) -> Result<RankEngine<S>> {
        config.db_name.get_or_insert_with(|| self.config.db_name.clone());
        RankEngine::new(self.store.clone(), config)
    }

    pub fn transaction_runner(&self, config: TransactionConfig) -> TransactionRunner<S> {
        TransactionRunner::new(self.store.clone(), config)
    }
}
