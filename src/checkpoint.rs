//! # Checkpoint Store
//!
//! Durable record of how far extraction has progressed per test-channel.
//! The backing file is a JSON map keyed by display name; values carry the
//! last extracted time (epoch seconds) and the cumulative row count.
//!
//! A missing backing file loads as an empty store — the first run of a new
//! deployment is not an error. Entries are upserted after each successful
//! extraction and never deleted automatically. Persistence is atomic: the
//! map is serialized to a temp file in the target directory and renamed
//! over the previous file, so a crash mid-run loses at most the in-progress
//! test-channel's update.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur during checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Atomic rename of the temp file failed
    #[error("checkpoint rename error: {0}")]
    RenameError(#[from] tempfile::PersistError),
}

/// Extraction progress for one test-channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last extracted wall-clock time, epoch seconds.
    pub last_time: f64,
    /// Cumulative number of data points extracted.
    pub row_count: u64,
}

/// Durable mapping from test-channel display name to its [`Checkpoint`].
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    entries: BTreeMap<String, Checkpoint>,
}

impl CheckpointStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let entries = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Whether a test-channel has been extracted before.
    #[must_use]
    pub fn is_known(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The checkpoint for a test-channel, if one exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Checkpoint> {
        self.entries.get(name)
    }

    /// Upsert the checkpoint for a test-channel. In-memory only until
    /// [`persist`](Self::persist) is called.
    pub fn update(&mut self, name: &str, last_time: f64, row_count: u64) {
        self.entries.insert(
            name.to_string(),
            Checkpoint {
                last_time,
                row_count,
            },
        );
    }

    /// Number of known test-channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Checkpoint)> {
        self.entries.iter().map(|(name, cp)| (name.as_str(), cp))
    }

    /// Durably write the store. Serializes to a temp file in the target
    /// directory and renames it over the previous file.
    pub fn persist(&self) -> Result<(), CheckpointError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::load(&dir.path().join("converted.json")).unwrap();
        assert!(store.is_empty());
        assert!(!store.is_known("cells_ch1"));
    }

    #[test]
    fn test_update_persist_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted.json");

        let mut store = CheckpointStore::load(&path).unwrap();
        store.update("cells_ch1", 1_514_764_800.5, 1200);
        store.update("cells_ch2", 1_514_764_900.0, 3400);
        store.persist().unwrap();

        let reloaded = CheckpointStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let cp = reloaded.get("cells_ch1").unwrap();
        assert_eq!(cp.last_time, 1_514_764_800.5);
        assert_eq!(cp.row_count, 1200);
    }

    #[test]
    fn test_upsert_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted.json");

        let mut store = CheckpointStore::load(&path).unwrap();
        store.update("cells_ch1", 100.0, 10);
        store.update("cells_ch1", 200.0, 25);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("cells_ch1").unwrap().row_count, 25);
    }

    #[test]
    fn test_persist_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/converted.json");

        let mut store = CheckpointStore::load(&path).unwrap();
        store.update("cells_ch1", 1.0, 1);
        store.persist().unwrap();
        assert!(path.exists());
    }
}
