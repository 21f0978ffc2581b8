use std::fs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::storage::layout::StorageLayout;
use crate::storage::wal::{WALEntry, WAL};
use crate::storage::StoreState;
use crate::core::error::Result;

/// Full store image; WAL entries at or after `wal_sequence` are not in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub wal_sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub doc_count: usize,
    pub state: StoreState,
}

impl Checkpoint {
    pub fn new(wal_sequence: u64, state: StoreState) -> Self {
        let doc_count = state.values().map(|docs| docs.len()).sum();
        Checkpoint {
            wal_sequence,
            timestamp: Utc::now(),
            doc_count,
            state,
        }
    }

    /// Load checkpoint from disk
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(path)?;
        let checkpoint = bincode::deserialize(&data)?;
        Ok(Some(checkpoint))
    }

    /// Save checkpoint to disk; the rename keeps the previous image intact
    /// until the new one is complete.
    pub fn save(&self, storage: &StorageLayout) -> Result<()> {
        let data = bincode::serialize(self)?;
        let tmp = storage.checkpoint_tmp_path();
        fs::write(&tmp, data)?;
        fs::File::open(&tmp)?.sync_all()?;
        fs::rename(tmp, storage.checkpoint_path())?;
        Ok(())
    }
}

/// What survived on disk: the last checkpoint plus the WAL entries after it.
pub struct Recovered {
    pub checkpoint: Option<Checkpoint>,
    pub entries: Vec<WALEntry>,
    /// Sequence the next WAL entry must use
    pub next_sequence: u64,
}

pub struct RecoveryManager;

impl RecoveryManager {
    pub fn recover(storage: &StorageLayout) -> Result<Recovered> {
        let checkpoint = Checkpoint::load(storage)?;
        let from = checkpoint.as_ref().map(|c| c.wal_sequence).unwrap_or(0);

        let mut entries = Vec::new();
        for sequence in WAL::find_wal_files(storage)? {
            for entry in WAL::read_entries(&storage.wal_path(sequence))? {
                if entry.sequence >= from {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by_key(|e| e.sequence);

        let next_sequence = entries.last().map(|e| e.sequence + 1).unwrap_or(from);

        if let Some(checkpoint) = &checkpoint {
            info!(
                timestamp = %checkpoint.timestamp,
                documents = checkpoint.doc_count,
                replayed = entries.len(),
                "recovering from checkpoint"
            );
        } else if !entries.is_empty() {
            info!(replayed = entries.len(), "recovering from WAL");
        }

        Ok(Recovered {
            checkpoint,
            entries,
            next_sequence,
        })
    }

    /// Drop log files fully covered by a checkpoint taken at `wal_sequence`.
    pub fn truncate_before(storage: &StorageLayout, wal_sequence: u64) -> Result<usize> {
        let mut removed = 0;
        for sequence in WAL::find_wal_files(storage)? {
            if sequence < wal_sequence {
                fs::remove_file(storage.wal_path(sequence))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use crate::core::types::Namespace;
    use crate::storage::wal::{Mutation, SyncMode};
    use crate::storage::apply_mutation;

    fn increment(id: &str) -> Mutation {
        Mutation::Increment {
            namespace: Namespace::new("db", "c"),
            id: id.to_string(),
            deltas: BTreeMap::from([("x".to_string(), 1)]),
        }
    }

    #[test]
    fn test_recover_skips_checkpointed_entries() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let mut wal = WAL::open(&storage, 0, SyncMode::None).unwrap();
        let mut state = StoreState::new();

        for id in ["a", "b"] {
            wal.append(vec![increment(id)]).unwrap();
            apply_mutation(&mut state, &increment(id));
        }
        Checkpoint::new(wal.sequence, state).save(&storage).unwrap();
        wal.rotate(&storage).unwrap();
        wal.append(vec![increment("c")]).unwrap();
        wal.sync().unwrap();

        let recovered = RecoveryManager::recover(&storage).unwrap();
        let checkpoint = recovered.checkpoint.unwrap();
        assert_eq!(checkpoint.wal_sequence, 2);
        assert_eq!(checkpoint.doc_count, 2);
        assert_eq!(recovered.entries.len(), 1);
        assert_eq!(recovered.entries[0].sequence, 2);
        assert_eq!(recovered.next_sequence, 3);

        assert_eq!(RecoveryManager::truncate_before(&storage, 2).unwrap(), 1);
        assert_eq!(WAL::find_wal_files(&storage).unwrap(), vec![2]);
    }

    #[test]
    fn test_recover_empty_directory() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path().to_path_buf()).unwrap();

        let recovered = RecoveryManager::recover(&storage).unwrap();
        assert!(recovered.checkpoint.is_none());
        assert!(recovered.entries.is_empty());
        assert_eq!(recovered.next_sequence, 0);
    }
}
