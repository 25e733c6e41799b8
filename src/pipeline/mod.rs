//! The shipping pipeline.
//!
//! The supervisor wires the glob scanner, the reader pool, the dispatcher
//! and one sender worker per endpoint together, and tears them all down on
//! shutdown. Batches flow through two bounded queues sized by the number
//! of endpoints: `ready` for fresh batches and `retry` for failed ones.

mod dispatcher;
mod sender;

pub use dispatcher::Batch;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::config::InputConfig;
use crate::sink::Sender;
use crate::source::{ReaderOptions, ReaderPool, Scanner};
use crate::stats::Statistics;

use dispatcher::Dispatcher;
use sender::SenderWorker;

/// Tuning knobs for the pipeline. The defaults are production values;
/// tests shrink the backoff bounds to keep timings short.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Records per batch handed to a sender.
    pub spool_size: usize,

    /// How frequently to glob for files that may have appeared.
    pub glob_refresh: Duration,

    /// Per-file reader tuning.
    pub reader: ReaderOptions,

    /// Backoff bounds for the dispatcher when no reader has work.
    pub poll_retry_minimum: Duration,
    pub poll_retry_maximum: Duration,

    /// Backoff bounds for a sender after a failed send.
    pub send_retry_minimum: Duration,
    pub send_retry_maximum: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            spool_size: 1024,
            glob_refresh: Duration::from_secs(15),
            reader: ReaderOptions::default(),
            poll_retry_minimum: Duration::from_millis(50),
            poll_retry_maximum: Duration::from_secs(5),
            send_retry_minimum: Duration::from_millis(50),
            send_retry_maximum: Duration::from_secs(5),
        }
    }
}

/// Pulls the entire program together: file readers feeding the dispatcher
/// through the pool, batches fanning out to the sender workers, and
/// checkpoints written only after a remote acknowledgement.
pub struct Supervisor {
    inputs: Vec<InputConfig>,
    senders: Vec<Box<dyn Sender>>,
    checkpoints: Arc<dyn CheckpointStore>,
    stats: Arc<Statistics>,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(
        inputs: Vec<InputConfig>,
        senders: Vec<Box<dyn Sender>>,
        checkpoints: Arc<dyn CheckpointStore>,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            inputs,
            senders,
            checkpoints,
            stats,
            options: SupervisorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    /// Run until `shutdown` fires, then wait for every task (readers,
    /// scanner, dispatcher, senders) to finish before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let pool = Arc::new(ReaderPool::new());
        let tracker = TaskTracker::new();

        let endpoints = self.senders.len().max(1);
        let (ready_tx, ready_rx) = flume::bounded::<Batch>(endpoints);
        let (retry_tx, retry_rx) = flume::bounded::<Batch>(endpoints);

        let scanner = Scanner::new(
            self.inputs,
            Arc::clone(&pool),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.stats),
            hostname,
            self.options.reader,
            self.options.glob_refresh,
            shutdown.clone(),
            tracker.clone(),
        );
        tracker.spawn(scanner.run());

        let dispatcher = Dispatcher::new(
            Arc::clone(&pool),
            ready_tx,
            Arc::clone(&self.stats),
            self.options,
            shutdown.clone(),
        );
        tracker.spawn(dispatcher.run());

        for sender in self.senders {
            let worker = SenderWorker::new(
                sender,
                ready_rx.clone(),
                retry_tx.clone(),
                retry_rx.clone(),
                Arc::clone(&pool),
                Arc::clone(&self.checkpoints),
                Arc::clone(&self.stats),
                self.options,
                shutdown.clone(),
            );
            tracker.spawn(worker.run());
        }
        drop(ready_rx);
        drop(retry_tx);
        drop(retry_rx);

        tracker.close();
        tracker.wait().await;
        info!("supervisor stopped");
    }
}
