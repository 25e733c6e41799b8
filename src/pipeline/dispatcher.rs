//! Batch builder.
//!
//! A single task drains available readers into batches. Locking a reader
//! while its records are in flight is what makes acknowledged positions
//! safe to checkpoint: a locked reader hands out nothing new, so the
//! largest position in the batch is the resume point for its file.

use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backoff::ExponentialBackoff;
use crate::source::{ReaderHandle, ReaderPool};
use crate::stats::Statistics;
use crate::types::Record;

use super::SupervisorOptions;

/// An ordered run of records plus the readers that produced them. The
/// contributors stay locked until a sender acknowledges the batch.
pub struct Batch {
    pub records: Vec<Record>,
    pub contributors: Vec<ReaderHandle>,
}

pub(super) struct Dispatcher {
    pool: Arc<ReaderPool>,
    ready: flume::Sender<Batch>,
    stats: Arc<Statistics>,
    options: SupervisorOptions,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub(super) fn new(
        pool: Arc<ReaderPool>,
        ready: flume::Sender<Batch>,
        stats: Arc<Statistics>,
        options: SupervisorOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            ready,
            stats,
            options,
            shutdown,
        }
    }

    pub(super) async fn run(self) {
        let mut poll_backoff = ExponentialBackoff::new(
            self.options.poll_retry_minimum,
            self.options.poll_retry_maximum,
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let batch = self.build_batch();

            let (available, locked) = self.pool.counts();
            self.stats.set_pool_counts(available, locked);

            if batch.records.is_empty() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_backoff.next()) => {}
                }
                continue;
            }

            poll_backoff.reset();
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.ready.send_async(batch) => {
                    if result.is_err() {
                        // Every sender is gone; nothing left to feed.
                        break;
                    }
                }
            }
        }

        debug!("dispatcher finished");
    }

    /// Drain one chunk from as many available readers as it takes to fill
    /// a batch, without ever blocking on any single reader. Readers with
    /// nothing buffered are set aside and unlocked when the pass ends, so
    /// one quiet file never starves the rest.
    fn build_batch(&self) -> Batch {
        let mut records = Vec::new();
        let mut contributors = Vec::new();
        let mut idle = Vec::new();

        while records.len() < self.options.spool_size {
            let Some(mut handle) = self.pool.lock_next() else {
                // No work available right now.
                break;
            };

            match handle.try_next_chunk() {
                Ok(chunk) => {
                    if let Some(last) = chunk.last() {
                        self.stats.set_file_position(&last.mark.path, last.mark.position);
                    }
                    records.extend(chunk);
                    contributors.push(handle);
                }
                Err(TryRecvError::Disconnected) => {
                    // The reader exited and its buffer is drained; the glob
                    // scanner may rediscover the path later.
                    debug!(path = %handle.path().display(), "removing finished reader");
                    self.stats.remove_file(handle.path());
                    self.pool.remove(handle);
                }
                Err(TryRecvError::Empty) => idle.push(handle),
            }
        }

        self.pool.unlock_all(idle);

        Batch {
            records,
            contributors,
        }
    }
}
