use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;

const WAL_PREFIX: &str = "wal_";
const WAL_EXTENSION: &str = "log";
const CHECKPOINT_FILE: &str = "checkpoint.bin";
const LOCK_FILE: &str = ".lock";

/// Files of one data directory:
///
/// ```text
/// <base>/.lock
/// <base>/wal/wal_00000000.log     first sequence stored in the file
/// <base>/meta/checkpoint.bin
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    pub wal_dir: PathBuf,
    pub meta_dir: PathBuf,
}

impl StorageLayout {
    /// Resolve and create the directory tree under `base_dir`.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let layout = StorageLayout {
            wal_dir: base_dir.join("wal"),
            meta_dir: base_dir.join("meta"),
            base_dir,
        };

        fs::create_dir_all(&layout.wal_dir)?;
        fs::create_dir_all(&layout.meta_dir)?;
        Ok(layout)
    }

    pub fn wal_path(&self, sequence: u64) -> PathBuf {
        self.wal_dir.join(format!("{WAL_PREFIX}{sequence:08}.{WAL_EXTENSION}"))
    }

    /// Inverse of [`StorageLayout::wal_path`]; `None` for foreign files.
    pub fn wal_sequence(path: &Path) -> Option<u64> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(WAL_EXTENSION) {
            return None;
        }
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.strip_prefix(WAL_PREFIX))
            .and_then(|sequence| sequence.parse().ok())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.meta_dir.join(CHECKPOINT_FILE)
    }

    /// Written first, then renamed over the checkpoint
    pub fn checkpoint_tmp_path(&self) -> PathBuf {
        self.meta_dir.join(format!("{CHECKPOINT_FILE}.tmp"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(LOCK_FILE)
    }
}
