//! squall: a log-shipping agent.
//!
//! squall tails local append-only log files matched by glob patterns,
//! turns each line into a key/value record, and forwards batches to
//! lumberjack-v1 endpoints over TLS. Acknowledged byte positions are
//! checkpointed durably, so delivery is at-least-once and no line is lost
//! across restarts or network failures.
//!
//! # Example
//!
//! ```ignore
//! use squall::{Config, Supervisor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_file("squall.json").unwrap();
//!     // build senders and a checkpoint store, then:
//!     // Supervisor::new(config.inputs, senders, checkpoints, stats)
//!     //     .run(CancellationToken::new())
//!     //     .await;
//! }
//! ```

pub mod backoff;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod signal;
pub mod sink;
pub mod source;
pub mod stats;
pub mod tls;
pub mod types;

// Re-export main types
pub use config::Config;
pub use pipeline::{Supervisor, SupervisorOptions};
pub use stats::Statistics;
pub use types::{HighWaterMark, Record};
