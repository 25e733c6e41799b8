//! Snapshot-in-time statistics.
//!
//! Statistics track where the agent currently is, as opposed to counters a
//! metrics pipeline would aggregate: per-file read and acknowledged
//! positions, per-endpoint send state, and reader pool occupancy. They are
//! exposed as JSON by the HTTP server in [`server`].
//!
//! The object is injected wherever it is written, so tests can construct
//! their own instance instead of sharing a global.

pub mod server;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// State of a tailed file as seen by its reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Reading,
    Eof,
    Closed,
}

/// State of a sender worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Sending,
    Retrying,
}

/// Per-file snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub status: FileStatus,

    /// Current size of the file on disk, refreshed just before
    /// serialization; -1 when the file cannot be stat'ed.
    pub size: i64,

    /// Byte position read into memory. May run ahead of
    /// `snapshot_position` while lines are buffered but unacknowledged.
    pub position: u64,

    pub last_read: Option<DateTime<Utc>>,

    /// Byte position acknowledged by a remote endpoint.
    pub snapshot_position: u64,

    pub last_snapshot: Option<DateTime<Utc>>,
}

impl FileStats {
    fn new() -> Self {
        Self {
            status: FileStatus::Reading,
            size: 0,
            position: 0,
            last_read: None,
            snapshot_position: 0,
            last_snapshot: None,
        }
    }
}

/// Per-endpoint snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub status: ClientStatus,
    pub lines_sent: u64,
    pub last_send_time: Option<DateTime<Utc>>,
    pub last_chunk_size: usize,
}

impl ClientStats {
    fn new() -> Self {
        Self {
            status: ClientStatus::Sending,
            lines_sent: 0,
            last_send_time: None,
            last_chunk_size: 0,
        }
    }
}

/// Reader pool occupancy.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStats {
    pub available: usize,
    pub locked: usize,
}

#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<String, ClientStats>,
    files: HashMap<PathBuf, FileStats>,
    pool: PoolStats,
}

/// Thread-safe snapshot statistics, shared by every task in the pipeline.
#[derive(Debug, Default)]
pub struct Statistics {
    inner: RwLock<Inner>,
}

/// The serialized shape served by the statistics endpoint.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub clients: HashMap<String, ClientStats>,
    pub file_reader_pool: PoolStats,
    pub files: HashMap<String, FileStats>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_client_status(&self, client: &str, status: ClientStatus) {
        let mut inner = self.inner.write().unwrap();
        inner
            .clients
            .entry(client.to_string())
            .or_insert_with(ClientStats::new)
            .status = status;
    }

    /// Record a successful send of `lines` records.
    pub fn record_send(&self, client: &str, lines: usize) {
        let mut inner = self.inner.write().unwrap();
        let stats = inner
            .clients
            .entry(client.to_string())
            .or_insert_with(ClientStats::new);
        stats.lines_sent += lines as u64;
        stats.last_chunk_size = lines;
        stats.last_send_time = Some(Utc::now());
    }

    pub fn set_file_status(&self, path: &Path, status: FileStatus) {
        let mut inner = self.inner.write().unwrap();
        inner
            .files
            .entry(path.to_path_buf())
            .or_insert_with(FileStats::new)
            .status = status;
    }

    pub fn set_file_position(&self, path: &Path, position: u64) {
        let mut inner = self.inner.write().unwrap();
        let stats = inner
            .files
            .entry(path.to_path_buf())
            .or_insert_with(FileStats::new);
        stats.position = position;
        stats.last_read = Some(Utc::now());
    }

    pub fn set_file_snapshot_position(&self, path: &Path, position: u64) {
        let mut inner = self.inner.write().unwrap();
        let stats = inner
            .files
            .entry(path.to_path_buf())
            .or_insert_with(FileStats::new);
        stats.snapshot_position = position;
        stats.last_snapshot = Some(Utc::now());
    }

    pub fn remove_file(&self, path: &Path) {
        let mut inner = self.inner.write().unwrap();
        inner.files.remove(path);
    }

    pub fn set_pool_counts(&self, available: usize, locked: usize) {
        let mut inner = self.inner.write().unwrap();
        inner.pool = PoolStats { available, locked };
    }

    /// Refresh each file's `size` by stat'ing it. Called immediately before
    /// serving a snapshot so consumers can compare progress against the
    /// file's current length.
    pub fn refresh_file_sizes(&self) {
        let paths: Vec<PathBuf> = {
            let inner = self.inner.read().unwrap();
            inner.files.keys().cloned().collect()
        };

        for path in paths {
            let size = match std::fs::metadata(&path) {
                Ok(meta) => meta.len() as i64,
                // Unknown size; maybe it was deleted?
                Err(_) => -1,
            };
            let mut inner = self.inner.write().unwrap();
            if let Some(stats) = inner.files.get_mut(&path) {
                stats.size = size;
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().unwrap();
        Snapshot {
            clients: inner.clients.clone(),
            file_reader_pool: inner.pool,
            files: inner
                .files
                .iter()
                .map(|(path, stats)| (path.display().to_string(), stats.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_has_expected_shape() {
        let stats = Statistics::new();
        stats.set_file_position(Path::new("/var/log/a.log"), 6);
        stats.set_file_snapshot_position(Path::new("/var/log/a.log"), 6);
        stats.record_send("localhost:5043", 1);
        stats.set_pool_counts(1, 0);

        let json = serde_json::to_value(stats.snapshot()).unwrap();

        assert_eq!(json["file_reader_pool"]["available"], 1);
        assert_eq!(json["files"]["/var/log/a.log"]["position"], 6);
        assert_eq!(json["files"]["/var/log/a.log"]["snapshot_position"], 6);
        assert_eq!(json["files"]["/var/log/a.log"]["status"], "reading");
        assert_eq!(json["clients"]["localhost:5043"]["lines_sent"], 1);
        assert_eq!(json["clients"]["localhost:5043"]["last_chunk_size"], 1);
        assert_eq!(json["clients"]["localhost:5043"]["status"], "sending");
    }

    #[test]
    fn refresh_reports_missing_files_as_negative() {
        let stats = Statistics::new();
        stats.set_file_position(Path::new("/nonexistent/never.log"), 3);
        stats.refresh_file_sizes();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.files["/nonexistent/never.log"].size, -1);
    }

    #[test]
    fn removed_files_disappear_from_snapshots() {
        let stats = Statistics::new();
        stats.set_file_position(Path::new("/var/log/a.log"), 6);
        stats.remove_file(Path::new("/var/log/a.log"));

        assert!(stats.snapshot().files.is_empty());
    }
}
