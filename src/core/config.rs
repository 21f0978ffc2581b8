use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::transaction::IsolationLevel;
use crate::core::types::Score;
use crate::storage::wal::SyncMode;

pub const DEFAULT_DB_NAME: &str = "default";
pub const DEFAULT_COLLECTION_NAME: &str = "Rank";

/// Store configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory; `None` keeps everything in memory
    pub storage_path: Option<PathBuf>,
    pub sync_mode: SyncMode,
    /// Journal entries between automatic checkpoints (0 disables)
    pub checkpoint_interval: u64,
    pub db_name: String,
}

impl Config {
    pub fn in_memory() -> Self {
        Config::default()
    }

    pub fn durable(path: impl Into<PathBuf>) -> Self {
        Config {
            storage_path: Some(path.into()),
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: None,
            sync_mode: SyncMode::Batch,
            checkpoint_interval: 10_000,
            db_name: DEFAULT_DB_NAME.to_string(),
        }
    }
}

/// Options handed to the transaction runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionConfig {
    /// Retries allowed after the first attempt; `None` retries forever
    pub max_retry: Option<u32>,
    pub isolation_level: IsolationLevel,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            max_retry: None,
            isolation_level: IsolationLevel::Serializable,
        }
    }
}

/// Construction options of a rank engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankConfig {
    pub min_score: Score,
    pub max_score: Score,
    pub branch_factor: u32,
    #[serde(default)]
    pub skip_transaction: bool,
    #[serde(default)]
    pub transaction: TransactionConfig,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Falls back to the owning database's name
    #[serde(default)]
    pub db_name: Option<String>,
}

fn default_collection_name() -> String {
    DEFAULT_COLLECTION_NAME.to_string()
}

impl RankConfig {
    pub fn new(min_score: Score, max_score: Score, branch_factor: u32) -> Self {
        RankConfig {
            min_score,
            max_score,
            branch_factor,
            skip_transaction: false,
            transaction: TransactionConfig::default(),
            collection_name: default_collection_name(),
            db_name: None,
        }
    }

    pub fn with_collection(mut self, collection_name: impl Into<String>) -> Self {
        self.collection_name = collection_name.into();
        self
    }

    pub fn with_db(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    pub fn with_skip_transaction(mut self, skip: bool) -> Self {
        self.skip_transaction = skip;
        self
    }

    pub fn with_transaction(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Rejects settings no topology can be derived from.
    pub fn validate(&self) -> Result<()> {
        if self.branch_factor < 2 {
            return Err(Error::validation(format!(
                "branchFactor must be >= 2, got {}",
                self.branch_factor
            )));
        }
        if self.min_score > self.max_score {
            return Err(Error::validation(format!(
                "minScore ({}) must be <= maxScore ({})",
                self.min_score, self.max_score
            )));
        }
        if self.max_score.checked_sub(self.min_score).and_then(|d| d.checked_add(1)).is_none() {
            return Err(Error::validation(format!(
                "score range [{}, {}] is too large",
                self.min_score, self.max_score
            )));
        }
        if self.collection_name.is_empty() {
            return Err(Error::validation("collectionName must not be empty"));
        }
        Ok(())
    }
}
