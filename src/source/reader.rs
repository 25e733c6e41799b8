//! Per-file reader task.
//!
//! Each tailed file gets one task that pulls complete lines, builds
//! records, and hands them to the dispatcher in chunks over a bounded
//! channel of capacity 1. The channel is the backpressure boundary: the
//! reader stalls as soon as nothing is draining it.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::backoff::ExponentialBackoff;
use crate::source::LineReader;
use crate::stats::{FileStatus, Statistics};
use crate::types::{Chunk, Record};

/// Records per chunk handed to the dispatcher.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Tuning for reader tasks.
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Records per chunk.
    pub chunk_size: usize,

    /// Backoff bounds while polling a file at EOF.
    pub eof_retry_minimum: Duration,
    pub eof_retry_maximum: Duration,

    /// Total time a reader keeps polling at EOF before closing. The glob
    /// scanner reopens the file if it grows again later.
    pub eof_timeout: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            eof_retry_minimum: Duration::from_millis(50),
            eof_retry_maximum: Duration::from_secs(5),
            eof_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// The pool-side face of a reader: the path it tails and the receiving end
/// of its chunk channel. The reading task itself owns the file and runs
/// independently; the handle travels between the pool and in-flight
/// batches.
#[derive(Debug)]
pub struct ReaderHandle {
    path: PathBuf,
    chunks: mpsc::Receiver<Chunk>,
}

impl ReaderHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking receive of the reader's next chunk.
    pub fn try_next_chunk(&mut self) -> Result<Chunk, TryRecvError> {
        self.chunks.try_recv()
    }
}

/// Reads one file from a resume offset until EOF sticks or a read fails.
pub struct FileReader {
    path: PathBuf,
    lines: LineReader,
    fields: HashMap<String, String>,
    hostname: String,
    options: ReaderOptions,
    chunks: mpsc::Sender<Chunk>,
    stats: Arc<Statistics>,
    shutdown: CancellationToken,
}

impl FileReader {
    /// Spawn the reader task for `file`, already seeked to `position`, and
    /// return the handle the pool hands to the dispatcher.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        file: File,
        path: PathBuf,
        position: u64,
        fields: HashMap<String, String>,
        hostname: String,
        options: ReaderOptions,
        stats: Arc<Statistics>,
        shutdown: CancellationToken,
        tracker: &TaskTracker,
    ) -> ReaderHandle {
        let (tx, rx) = mpsc::channel(1);

        let reader = FileReader {
            path: path.clone(),
            lines: LineReader::new(file, position),
            fields,
            hostname,
            options,
            chunks: tx,
            stats,
            shutdown,
        };
        tracker.spawn(reader.run());

        ReaderHandle { path, chunks: rx }
    }

    async fn run(mut self) {
        debug!(path = %self.path.display(), "reader started");

        let mut chunk: Chunk = Vec::with_capacity(self.options.chunk_size);
        let mut eof_backoff = ExponentialBackoff::new(
            self.options.eof_retry_minimum,
            self.options.eof_retry_maximum,
        );
        let mut eof_since: Option<Instant> = None;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.lines.next_line() {
                Ok(Some(line)) => {
                    eof_since = None;
                    eof_backoff.reset();
                    self.stats.set_file_status(&self.path, FileStatus::Reading);

                    let record = Record::from_line(
                        &line.text(),
                        &self.path,
                        self.lines.position(),
                        &self.hostname,
                        &self.fields,
                    );
                    chunk.push(record);

                    if chunk.len() >= self.options.chunk_size
                        && !self.flush(&mut chunk).await
                    {
                        break;
                    }
                }
                Ok(None) => {
                    self.stats.set_file_status(&self.path, FileStatus::Eof);

                    // Deliver what we have before waiting for appends.
                    if !chunk.is_empty() && !self.flush(&mut chunk).await {
                        break;
                    }

                    match eof_since {
                        None => eof_since = Some(Instant::now()),
                        Some(since) if since.elapsed() >= self.options.eof_timeout => {
                            debug!(path = %self.path.display(), "EOF timeout, closing file");
                            break;
                        }
                        Some(_) => {}
                    }

                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(eof_backoff.next()) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to read file, closing it"
                    );
                    if !chunk.is_empty() {
                        self.flush(&mut chunk).await;
                    }
                    break;
                }
            }
        }

        self.stats.set_file_status(&self.path, FileStatus::Closed);
        debug!(path = %self.path.display(), "reader finished");
        // Dropping the sender closes the chunk channel; the dispatcher
        // removes the handle from the pool once it drains.
    }

    /// Hand the accumulated chunk to the dispatcher. Returns false when the
    /// downstream is gone or shutdown fired.
    async fn flush(&mut self, chunk: &mut Chunk) -> bool {
        let outgoing = std::mem::take(chunk);
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            result = self.chunks.send(outgoing) => result.is_ok(),
        }
    }
}
