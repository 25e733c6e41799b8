//! Sender workers.
//!
//! One task per configured endpoint, all pulling from the shared `ready`
//! queue and the shared `retry` queue (retries first). Endpoints are peers
//! sharing load, not mirrors: a batch goes to exactly one endpoint, and a
//! failed batch may be picked up by a different one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::ExponentialBackoff;
use crate::checkpoint::CheckpointStore;
use crate::sink::Sender;
use crate::source::ReaderPool;
use crate::stats::{ClientStatus, Statistics};
use crate::types::{HighWaterMark, Record};

use super::dispatcher::Batch;
use super::SupervisorOptions;

pub(super) struct SenderWorker {
    sender: Box<dyn Sender>,
    ready: flume::Receiver<Batch>,
    retry_tx: flume::Sender<Batch>,
    retry_rx: flume::Receiver<Batch>,
    pool: Arc<ReaderPool>,
    checkpoints: Arc<dyn CheckpointStore>,
    stats: Arc<Statistics>,
    options: SupervisorOptions,
    shutdown: CancellationToken,
}

impl SenderWorker {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        sender: Box<dyn Sender>,
        ready: flume::Receiver<Batch>,
        retry_tx: flume::Sender<Batch>,
        retry_rx: flume::Receiver<Batch>,
        pool: Arc<ReaderPool>,
        checkpoints: Arc<dyn CheckpointStore>,
        stats: Arc<Statistics>,
        options: SupervisorOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sender,
            ready,
            retry_tx,
            retry_rx,
            pool,
            checkpoints,
            stats,
            options,
            shutdown,
        }
    }

    pub(super) async fn run(mut self) {
        let name = self.sender.name().to_string();
        let mut send_backoff = ExponentialBackoff::new(
            self.options.send_retry_minimum,
            self.options.send_retry_maximum,
        );

        loop {
            // Prefer a failed batch over new work.
            let batch = match self.retry_rx.try_recv() {
                Ok(batch) => batch,
                Err(_) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        result = self.retry_rx.recv_async() => match result {
                            Ok(batch) => batch,
                            Err(_) => break,
                        },
                        result = self.ready.recv_async() => match result {
                            Ok(batch) => batch,
                            Err(_) => break,
                        },
                    }
                }
            };

            self.stats.set_client_status(&name, ClientStatus::Sending);

            match self.sender.send(&batch.records).await {
                Err(e) => {
                    warn!(client = %name, error = %e, "failed to send batch, retrying");
                    self.stats.set_client_status(&name, ClientStatus::Retrying);

                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        result = self.retry_tx.send_async(batch) => {
                            if result.is_err() {
                                break;
                            }
                        }
                    }

                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(send_backoff.next()) => {}
                    }
                }
                Ok(()) => {
                    send_backoff.reset();
                    self.acknowledge(&name, batch);
                }
            }
        }

        debug!(client = %name, "sender finished");
    }

    /// Checkpoint the batch's terminal positions and release its readers.
    ///
    /// The remote has already accepted the records; re-sending would
    /// duplicate them. A checkpoint failure is therefore logged and the
    /// readers are unlocked anyway. The positions are written by the next
    /// acknowledged batch, or replayed after a restart.
    fn acknowledge(&self, name: &str, batch: Batch) {
        let lines = batch.records.len();
        let marks = terminal_marks(&batch.records);

        match self.checkpoints.set_high_water_marks(&marks) {
            Ok(()) => {
                for mark in &marks {
                    self.stats
                        .set_file_snapshot_position(&mark.path, mark.position);
                }
            }
            Err(e) => {
                warn!(client = %name, error = %e, "failed to checkpoint high water marks");
            }
        }

        self.pool.unlock_all(batch.contributors);
        self.stats.record_send(name, lines);
    }
}

/// The highest position per distinct path in the batch.
fn terminal_marks(records: &[Record]) -> Vec<HighWaterMark> {
    let mut highest: HashMap<&PathBuf, u64> = HashMap::new();
    for record in records {
        let entry = highest.entry(&record.mark.path).or_insert(record.mark.position);
        if record.mark.position > *entry {
            *entry = record.mark.position;
        }
    }

    highest
        .into_iter()
        .map(|(path, position)| HighWaterMark::new(path.clone(), position))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    fn record(path: &str, position: u64) -> Record {
        Record::from_line("line", Path::new(path), position, "test-host", &HashMap::new())
    }

    #[test]
    fn terminal_marks_keep_the_highest_position_per_path() {
        let records = vec![
            record("/var/log/a.log", 6),
            record("/var/log/a.log", 12),
            record("/var/log/b.log", 7),
            record("/var/log/a.log", 18),
        ];

        let mut marks = terminal_marks(&records);
        marks.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0], HighWaterMark::new("/var/log/a.log", 18));
        assert_eq!(marks[1], HighWaterMark::new("/var/log/b.log", 7));
    }
}
