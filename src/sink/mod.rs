//! Remote senders.
//!
//! A [`Sender`] forwards a batch of records to a remote system. The
//! production implementation is the lumberjack client; the in-memory and
//! stdout variants exist for tests and development.

pub mod lumberjack;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{InjectedSnafu, SendError};
use crate::types::Record;

pub use lumberjack::{LumberjackOptions, LumberjackSender};

/// Forwards batches of records to a remote system.
#[async_trait]
pub trait Sender: Send {
    /// A human-readable unique name, for use in statistics. For a remote
    /// endpoint the `host:port` address is a reasonable name.
    fn name(&self) -> &str;

    /// Deliver `records`; returning `Ok` means the remote acknowledged
    /// the whole batch.
    async fn send(&mut self, records: &[Record]) -> Result<(), SendError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    sent: Vec<Record>,
    fail_with: Option<String>,
}

/// In-memory sender that records everything "sent" through it, with an
/// optionally injected error. Useful in tests; clone it to keep a handle
/// for inspection while the pipeline owns the original.
#[derive(Debug, Clone)]
pub struct MemorySender {
    name: String,
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySender {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(MemoryInner::default())),
        }
    }

    /// Everything successfully sent so far, in order.
    pub fn sent(&self) -> Vec<Record> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().unwrap().sent.len()
    }

    /// Make every following `send` fail with `message` until cleared with
    /// `None`.
    pub fn fail_with(&self, message: Option<&str>) {
        self.inner.lock().unwrap().fail_with = message.map(str::to_string);
    }
}

#[async_trait]
impl Sender for MemorySender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&mut self, records: &[Record]) -> Result<(), SendError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.fail_with {
            return InjectedSnafu {
                message: message.clone(),
            }
            .fail();
        }
        inner.sent.extend_from_slice(records);
        Ok(())
    }
}

/// Prints records to standard out. Useful for development.
#[derive(Debug, Default)]
pub struct StdoutSender;

impl StdoutSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sender for StdoutSender {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn send(&mut self, records: &[Record]) -> Result<(), SendError> {
        for record in records {
            if let Ok(json) = serde_json::to_string(&record.fields) {
                println!("{json}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    fn record(line: &str) -> Record {
        Record::from_line(line, Path::new("/tmp/a.log"), 6, "test-host", &HashMap::new())
    }

    #[tokio::test]
    async fn memory_sender_records_sent_batches() {
        let sender = MemorySender::new("memory");
        let mut boxed: Box<dyn Sender> = Box::new(sender.clone());

        boxed.send(&[record("line1"), record("line2")]).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].fields["line"], "line1");
    }

    #[tokio::test]
    async fn memory_sender_injects_errors() {
        let sender = MemorySender::new("memory");
        let mut boxed: Box<dyn Sender> = Box::new(sender.clone());

        sender.fail_with(Some("something went wrong"));
        assert!(boxed.send(&[record("line1")]).await.is_err());
        assert_eq!(sender.sent_count(), 0);

        sender.fail_with(None);
        boxed.send(&[record("line1")]).await.unwrap();
        assert_eq!(sender.sent_count(), 1);
    }
}
