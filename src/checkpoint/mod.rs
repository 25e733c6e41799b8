//! Durable high-water-mark checkpoints.
//!
//! The checkpoint store maps each tailed file path to the byte offset that
//! has been acknowledged by a remote endpoint. A position must be durable
//! before `set_high_water_marks` returns; on restart the glob scanner
//! resumes every file from its stored position.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{
    CheckpointError, OpenStoreSnafu, ParseStoreSnafu, PersistStoreSnafu, SerializeStoreSnafu,
};
use crate::types::HighWaterMark;

/// Durable mapping from file path to acknowledged byte offset.
///
/// `set_high_water_marks` applies all marks as one group and must not
/// return success before the update is durable.
pub trait CheckpointStore: Send + Sync {
    /// The acknowledged position for `path`, or 0 when unknown.
    fn high_water_mark(&self, path: &Path) -> Result<u64, CheckpointError>;

    /// Durably record the given marks as a single atomic group.
    fn set_high_water_marks(&self, marks: &[HighWaterMark]) -> Result<(), CheckpointError>;
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    positions: Mutex<HashMap<PathBuf, u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn high_water_mark(&self, path: &Path) -> Result<u64, CheckpointError> {
        let positions = self.positions.lock().unwrap();
        Ok(positions.get(path).copied().unwrap_or(0))
    }

    fn set_high_water_marks(&self, marks: &[HighWaterMark]) -> Result<(), CheckpointError> {
        let mut positions = self.positions.lock().unwrap();
        for mark in marks {
            positions.insert(mark.path.clone(), mark.position);
        }
        Ok(())
    }
}

/// The serialized shape of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    positions: HashMap<PathBuf, u64>,
}

/// File-backed store: one JSON document rewritten atomically on every
/// update (write to a temporary sibling, fsync, rename).
pub struct FileCheckpointStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileCheckpointStore {
    /// Open the store at `path`, creating parent directories and starting
    /// empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path).context(OpenStoreSnafu)?;
            serde_json::from_reader(BufReader::new(file)).context(ParseStoreSnafu)?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).context(OpenStoreSnafu)?;
                }
            }
            StoreState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &StoreState) -> Result<(), CheckpointError> {
        let tmp_path = self.path.with_extension("tmp");

        let file = File::create(&tmp_path).context(PersistStoreSnafu)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, state).context(SerializeStoreSnafu)?;
        writer.flush().context(PersistStoreSnafu)?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all())
            .context(PersistStoreSnafu)?;

        fs::rename(&tmp_path, &self.path).context(PersistStoreSnafu)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn high_water_mark(&self, path: &Path) -> Result<u64, CheckpointError> {
        let state = self.state.lock().unwrap();
        Ok(state.positions.get(path).copied().unwrap_or(0))
    }

    fn set_high_water_marks(&self, marks: &[HighWaterMark]) -> Result<(), CheckpointError> {
        let mut state = self.state.lock().unwrap();
        for mark in marks {
            state.positions.insert(mark.path.clone(), mark.position);
        }
        self.persist(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_path_yields_zero() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.high_water_mark(Path::new("/var/log/new.log")).unwrap(), 0);
    }

    #[test]
    fn marks_apply_as_a_group() {
        let store = MemoryCheckpointStore::new();
        store
            .set_high_water_marks(&[
                HighWaterMark::new("/var/log/a.log", 6),
                HighWaterMark::new("/var/log/b.log", 14),
            ])
            .unwrap();

        assert_eq!(store.high_water_mark(Path::new("/var/log/a.log")).unwrap(), 6);
        assert_eq!(store.high_water_mark(Path::new("/var/log/b.log")).unwrap(), 14);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");

        {
            let store = FileCheckpointStore::open(&state_path).unwrap();
            store
                .set_high_water_marks(&[HighWaterMark::new("/var/log/a.log", 42)])
                .unwrap();
        }

        let store = FileCheckpointStore::open(&state_path).unwrap();
        assert_eq!(store.high_water_mark(Path::new("/var/log/a.log")).unwrap(), 42);
        assert_eq!(store.high_water_mark(Path::new("/var/log/other.log")).unwrap(), 0);
    }

    #[test]
    fn file_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("nested/dir/state.json");

        let store = FileCheckpointStore::open(&state_path).unwrap();
        store
            .set_high_water_marks(&[HighWaterMark::new("/var/log/a.log", 1)])
            .unwrap();

        assert!(state_path.exists());
    }

    #[test]
    fn later_marks_overwrite_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path().join("state.json")).unwrap();

        store
            .set_high_water_marks(&[HighWaterMark::new("/var/log/a.log", 6)])
            .unwrap();
        store
            .set_high_water_marks(&[HighWaterMark::new("/var/log/a.log", 12)])
            .unwrap();

        assert_eq!(store.high_water_mark(Path::new("/var/log/a.log")).unwrap(), 12);
    }
}
