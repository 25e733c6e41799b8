//! Configuration parsing and validation.
//!
//! Configuration is a single JSON document naming the checkpoint state
//! path, the remote servers (with TLS material), an optional statistics
//! listener, and the input groups of glob patterns to tail.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyStatePathSnafu, JsonParseSnafu, NoInputsSnafu, NoServersSnafu, ReadFileSnafu,
};

/// Main configuration structure for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the checkpoint state file.
    pub state: PathBuf,

    pub network: NetworkConfig,

    /// Statistics HTTP listener (optional; disabled when absent).
    #[serde(default)]
    pub statistics: Option<StatisticsConfig>,

    pub inputs: Vec<InputConfig>,
}

/// Remote endpoints and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub servers: Vec<ServerConfig>,

    /// Path to a PEM client certificate (enables TLS together with `key`).
    #[serde(default)]
    pub certificate: Option<PathBuf>,

    /// Path to the PEM private key for `certificate`.
    #[serde(default)]
    pub key: Option<PathBuf>,

    /// Path to a PEM CA bundle; system roots are used when absent.
    #[serde(default)]
    pub ca: Option<PathBuf>,

    /// Connect and send timeout in seconds (default: 15).
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,

    /// Records per batch handed to a sender (default: 1024).
    #[serde(default = "default_spool_size")]
    pub spool_size: usize,
}

/// A single remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `host:port` of the endpoint.
    pub addr: String,

    /// TLS server name; the host portion of `addr` is used when absent.
    #[serde(default)]
    pub name: Option<String>,
}

/// Statistics HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Address to bind the statistics server (e.g. "127.0.0.1:8089").
    pub addr: String,
}

/// A group of files sharing a set of static fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Glob patterns naming the files to tail.
    pub paths: Vec<String>,

    /// Static fields attached to every record from these files.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_spool_size() -> usize {
    1024
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        let config: Config = serde_json::from_str(&content).context(JsonParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.network.servers.is_empty(), NoServersSnafu);
        ensure!(!self.inputs.is_empty(), NoInputsSnafu);
        ensure!(!self.state.as_os_str().is_empty(), EmptyStatePathSnafu);
        Ok(())
    }
}

impl NetworkConfig {
    /// The connect and send timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
