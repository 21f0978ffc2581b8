use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Write, Read};
use std::path::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::core::types::Namespace;
use crate::storage::layout::StorageLayout;
use crate::core::error::{Result, Error, ErrorKind};

/// Upper bound of a single frame; anything larger is treated as corruption
const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Unsynced bytes tolerated in `SyncMode::Batch`
const BATCH_SYNC_BYTES: u64 = 1024 * 1024;

/// Write-ahead log for durability
pub struct WAL {
    pub file: File,
    pub position: u64,
    pub sync_mode: SyncMode,
    /// Sequence assigned to the next appended entry
    pub sequence: u64,
    unsynced: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Immediate,  // fsync after every write
    Batch,      // fsync periodically
    None,       // Let OS handle it
}

/// One committed batch; replay applies all of its mutations or none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WALEntry {
    pub sequence: u64,
    pub mutations: Vec<Mutation>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Upsert adding `deltas` to the document's fields
    Increment {
        namespace: Namespace,
        id: String,
        deltas: BTreeMap<String, i64>,
    },
    /// Insert `values` unless the document already exists
    SetOnInsert {
        namespace: Namespace,
        id: String,
        values: BTreeMap<String, i64>,
    },
}

impl WAL {
    /// Open the log file starting at `sequence`, appending to it if present.
    pub fn open(storage: &StorageLayout, sequence: u64, sync_mode: SyncMode) -> Result<Self> {
        let path = storage.wal_path(sequence);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let position = file.metadata()?.len();

        Ok(WAL {
            file,
            position,
            sync_mode,
            sequence,
            unsynced: 0,
        })
    }

    pub fn append(&mut self, mutations: Vec<Mutation>) -> Result<u64> {
        let entry = WALEntry {
            sequence: self.sequence,
            mutations,
            timestamp: Utc::now(),
        };

        let data = bincode::serialize(&entry)?;
        let len = data.len() as u32;
        let checksum = crc32fast::hash(&data);

        // Write length + data + checksum in one frame
        let mut frame = Vec::with_capacity(data.len() + 8);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&checksum.to_le_bytes());
        self.file.write_all(&frame)?;

        let sequence = self.sequence;
        self.sequence += 1;
        self.position += frame.len() as u64;
        self.unsynced += frame.len() as u64;

        // Sync based on mode
        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batch if self.unsynced >= BATCH_SYNC_BYTES => self.sync()?,
            _ => {}
        }

        Ok(sequence)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Continue in a fresh file named after the next sequence.
    pub fn rotate(&mut self, storage: &StorageLayout) -> Result<()> {
        self.sync()?;

        let new_wal = WAL::open(storage, self.sequence, self.sync_mode)?;
        *self = new_wal;

        Ok(())
    }

    /// Read every intact entry of one log file.
    ///
    /// Stops at the first torn or corrupted frame: everything after it was
    /// never acknowledged as durable.
    pub fn read_entries(path: &Path) -> Result<Vec<WALEntry>> {
        let mut entries = Vec::new();
        let mut file = File::open(path)?;

        loop {
            // Try to read length
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::new(ErrorKind::Io, format!("Failed to read WAL: {}", e))),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_ENTRY_SIZE {
                warn!(path = %path.display(), len, "oversized WAL frame: ignoring tail");
                break;
            }

            let mut data = vec![0u8; len];
            let mut checksum_buf = [0u8; 4];
            if file.read_exact(&mut data).is_err() || file.read_exact(&mut checksum_buf).is_err() {
                warn!(path = %path.display(), "torn WAL frame: ignoring tail");
                break;
            }

            let stored = u32::from_le_bytes(checksum_buf);
            let computed = crc32fast::hash(&data);
            if stored != computed {
                warn!(path = %path.display(), stored, computed, "WAL checksum mismatch: ignoring tail");
                break;
            }

            entries.push(bincode::deserialize::<WALEntry>(&data)?);
        }

        Ok(entries)
    }

    /// Starting sequences of all WAL files, ascending
    pub fn find_wal_files(storage: &StorageLayout) -> Result<Vec<u64>> {
        let mut sequences = Vec::new();

        if storage.wal_dir.exists() {
            for entry in std::fs::read_dir(&storage.wal_dir)? {
                if let Some(sequence) = StorageLayout::wal_sequence(&entry?.path()) {
                    sequences.push(sequence);
                }
            }
        }

        sequences.sort_unstable();
        Ok(sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn increment(id: &str, delta: i64) -> Mutation {
        Mutation::Increment {
            namespace: Namespace::new("db", "c"),
            id: id.to_string(),
            deltas: BTreeMap::from([("x".to_string(), delta)]),
        }
    }

    #[test]
    fn test_append_assigns_sequences() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let mut wal = WAL::open(&storage, 5, SyncMode::None).unwrap();

        assert_eq!(wal.append(vec![increment("a", 1)]).unwrap(), 5);
        assert_eq!(wal.append(vec![increment("b", 2), increment("a", -1)]).unwrap(), 6);
        wal.sync().unwrap();

        let entries = WAL::read_entries(&storage.wal_path(5)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].sequence, 6);
        assert_eq!(entries[1].mutations, vec![increment("b", 2), increment("a", -1)]);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let mut wal = WAL::open(&storage, 0, SyncMode::Immediate).unwrap();
        wal.append(vec![increment("a", 1)]).unwrap();
        wal.append(vec![increment("a", 1)]).unwrap();

        // Half a frame: a length prefix promising more than follows
        wal.file.write_all(&100u32.to_le_bytes()).unwrap();
        wal.file.write_all(&[1, 2, 3]).unwrap();

        let entries = WAL::read_entries(&storage.wal_path(0)).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_stops_replay() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let mut wal = WAL::open(&storage, 0, SyncMode::None).unwrap();
        wal.append(vec![increment("a", 1)]).unwrap();
        let first_frame = wal.position as usize;
        wal.append(vec![increment("b", 1)]).unwrap();
        wal.sync().unwrap();

        let path = storage.wal_path(0);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[first_frame + 6] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let entries = WAL::read_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mutations, vec![increment("a", 1)]);
    }

    #[test]
    fn test_rotate_and_find_files() {
        let dir = TempDir::new().unwrap();
        let storage = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let mut wal = WAL::open(&storage, 0, SyncMode::None).unwrap();
        wal.append(vec![increment("a", 1)]).unwrap();
        wal.append(vec![increment("a", 1)]).unwrap();
        wal.rotate(&storage).unwrap();
        wal.append(vec![increment("a", 1)]).unwrap();

        assert_eq!(wal.sequence, 3);
        assert_eq!(WAL::find_wal_files(&storage).unwrap(), vec![0, 2]);
        assert_eq!(WAL::read_entries(&storage.wal_path(2)).unwrap()[0].sequence, 2);
    }
}
