//! squall: a standalone agent that ships local log files to lumberjack
//! endpoints.
//!
//! The agent tails every file matched by the configured glob patterns and
//! forwards batches of line records over TLS, checkpointing acknowledged
//! positions so that a restart resumes exactly where delivery left off.

mod backoff;
mod checkpoint;
mod config;
mod error;
mod pipeline;
mod signal;
mod sink;
mod source;
mod stats;
mod tls;
mod types;

use clap::Parser;
use snafu::prelude::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use checkpoint::{CheckpointStore, FileCheckpointStore};
use config::Config;
use error::{
    AddressParseSnafu, AgentError, CheckpointSnafu, ConfigSnafu, TaskJoinSnafu, TlsSnafu,
};
use pipeline::{Supervisor, SupervisorOptions};
use sink::{LumberjackOptions, LumberjackSender, Sender};
use stats::Statistics;

/// Log-shipping agent speaking the lumberjack protocol.
#[derive(Parser, Debug)]
#[command(name = "squall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), AgentError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("squall starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;
    let tls_config = tls::client_config(&config.network).context(TlsSnafu)?;

    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpointStore::open(&config.state).context(CheckpointSnafu)?);
    let stats = Arc::new(Statistics::new());
    let shutdown = CancellationToken::new();

    if let Some(statistics) = &config.statistics {
        let addr: SocketAddr = statistics.addr.parse().context(AddressParseSnafu {
            address: statistics.addr.clone(),
        })?;
        tokio::spawn(stats::server::serve(
            addr,
            Arc::clone(&stats),
            shutdown.clone(),
        ));
        debug!("Statistics endpoint listening on http://{}/", statistics.addr);
    }

    let timeout = config.network.timeout();
    let senders: Vec<Box<dyn Sender>> = config
        .network
        .servers
        .iter()
        .map(|server| {
            Box::new(LumberjackSender::new(LumberjackOptions {
                address: server.addr.clone(),
                server_name: server.name.clone(),
                tls: tls_config.clone(),
                connect_timeout: timeout,
                send_timeout: timeout,
            })) as Box<dyn Sender>
        })
        .collect();

    let options = SupervisorOptions {
        spool_size: config.network.spool_size,
        ..Default::default()
    };
    let supervisor = Supervisor::new(config.inputs, senders, checkpoints, stats)
        .with_options(options);

    let pipeline = tokio::spawn(supervisor.run(shutdown.clone()));

    signal::shutdown_signal().await;
    info!("Shutting down cleanly");
    shutdown.cancel();
    pipeline.await.context(TaskJoinSnafu)?;
    info!("Done shutting down");

    Ok(())
}
