//! Glob scanner.
//!
//! Periodically expands the configured glob patterns. Every match that is
//! not already in the pool is opened at its checkpointed position and gets
//! a reader task. Failures on one path never stop the scan.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::InputConfig;
use crate::source::{FileReader, ReaderOptions, ReaderPool};
use crate::stats::{FileStatus, Statistics};

/// Discovers files and keeps one reader per matched path alive.
pub struct Scanner {
    inputs: Vec<InputConfig>,
    pool: Arc<ReaderPool>,
    checkpoints: Arc<dyn CheckpointStore>,
    stats: Arc<Statistics>,
    hostname: String,
    reader_options: ReaderOptions,
    refresh: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inputs: Vec<InputConfig>,
        pool: Arc<ReaderPool>,
        checkpoints: Arc<dyn CheckpointStore>,
        stats: Arc<Statistics>,
        hostname: String,
        reader_options: ReaderOptions,
        refresh: Duration,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            inputs,
            pool,
            checkpoints,
            stats,
            hostname,
            reader_options,
            refresh,
            shutdown,
            tracker,
        }
    }

    /// Scan immediately, then on every refresh interval until shutdown.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.scan(),
            }
        }

        debug!("scanner finished");
    }

    /// One pass over every configured glob pattern.
    pub fn scan(&self) {
        for input in &self.inputs {
            for pattern in &input.paths {
                let matches = match glob::glob(pattern) {
                    Ok(matches) => matches,
                    Err(e) => {
                        warn!(pattern, error = %e, "failed to glob, skipping path");
                        continue;
                    }
                };

                for entry in matches {
                    match entry {
                        Ok(path) => self.start_reader(&path, &input.fields),
                        Err(e) => {
                            warn!(pattern, error = %e, "unreadable glob match, skipping");
                        }
                    }
                }
            }
        }
    }

    /// Open `path` at its checkpointed position and add a reader for it,
    /// unless one is already in the pool.
    fn start_reader(&self, path: &Path, fields: &HashMap<String, String>) {
        if self.pool.contains(path) {
            return;
        }

        let position = match self.checkpoints.high_water_mark(path) {
            Ok(position) => position,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read checkpoint, skipping file");
                return;
            }
        };

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open, skipping file");
                return;
            }
        };

        if let Err(e) = file.seek(SeekFrom::Start(position)) {
            warn!(path = %path.display(), error = %e, "failed to seek, skipping file");
            return;
        }

        debug!(path = %path.display(), position, "starting reader");

        self.stats.set_file_status(path, FileStatus::Reading);
        self.stats.set_file_position(path, position);
        self.stats.set_file_snapshot_position(path, position);

        let handle = FileReader::spawn(
            file,
            path.to_path_buf(),
            position,
            fields.clone(),
            self.hostname.clone(),
            self.reader_options,
            Arc::clone(&self.stats),
            self.shutdown.clone(),
            &self.tracker,
        );
        self.pool.add(handle);

        let (available, locked) = self.pool.counts();
        self.stats.set_pool_counts(available, locked);
    }
}
