//! Error types for squall using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse JSON configuration.
    #[snafu(display("Failed to parse JSON configuration"))]
    JsonParse { source: serde_json::Error },

    /// No remote servers configured.
    #[snafu(display("At least one network server must be configured"))]
    NoServers,

    /// No inputs configured.
    #[snafu(display("At least one input must be configured"))]
    NoInputs,

    /// State path is empty.
    #[snafu(display("State path cannot be empty"))]
    EmptyStatePath,
}

// ============ TLS Errors ============

/// Errors that can occur while loading TLS material.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TlsError {
    /// Failed to read a PEM certificate file.
    #[snafu(display("Failed to read certificate from {path}"))]
    ReadCertificate {
        path: String,
        source: rustls_pki_types::pem::Error,
    },

    /// Failed to read a PEM private key file.
    #[snafu(display("Failed to read private key from {path}"))]
    ReadKey {
        path: String,
        source: rustls_pki_types::pem::Error,
    },

    /// Failed to add a certificate to the root store.
    #[snafu(display("Invalid CA certificate in {path}"))]
    InvalidCaCertificate {
        path: String,
        source: tokio_rustls::rustls::Error,
    },

    /// Failed to build the client configuration.
    #[snafu(display("Failed to build TLS client configuration"))]
    ClientConfig {
        source: tokio_rustls::rustls::Error,
    },
}

// ============ Checkpoint Errors ============

/// Errors that can occur reading or writing the checkpoint store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Failed to open or read the store file.
    #[snafu(display("Failed to open checkpoint store"))]
    OpenStore { source: std::io::Error },

    /// The store file contained invalid JSON.
    #[snafu(display("Failed to parse checkpoint store"))]
    ParseStore { source: serde_json::Error },

    /// Failed to serialize checkpoint state.
    #[snafu(display("Failed to serialize checkpoint state"))]
    SerializeStore { source: serde_json::Error },

    /// Failed to durably write the store file.
    #[snafu(display("Failed to persist checkpoint store"))]
    PersistStore { source: std::io::Error },
}

// ============ Send Errors ============

/// Errors that can occur sending a batch to a remote endpoint.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SendError {
    /// TCP connect failed.
    #[snafu(display("Failed to connect to {address}"))]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// TCP connect did not complete within the connection timeout.
    #[snafu(display("Timed out connecting to {address}"))]
    ConnectTimeout { address: String },

    /// The configured server name is not a valid SNI name.
    #[snafu(display("Invalid TLS server name {name:?}"))]
    InvalidServerName { name: String },

    /// TLS handshake failed.
    #[snafu(display("TLS handshake with {address} failed"))]
    Handshake {
        address: String,
        source: std::io::Error,
    },

    /// Serializing the payload failed.
    #[snafu(display("Failed to serialize payload"))]
    Serialize { source: std::io::Error },

    /// A socket write or the ACK read failed.
    #[snafu(display("Wire error talking to {address}"))]
    Wire {
        address: String,
        source: std::io::Error,
    },

    /// The send did not complete within the send timeout.
    #[snafu(display("Send to {address} timed out"))]
    SendTimeout { address: String },

    /// Injected test failure.
    #[snafu(display("{message}"))]
    Injected { message: String },
}

// ============ Agent Error (top-level) ============

/// Top-level errors that aggregate all startup failure modes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AgentError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// TLS material error.
    #[snafu(display("TLS error"))]
    Tls { source: TlsError },

    /// Checkpoint store error.
    #[snafu(display("Checkpoint store error"))]
    Checkpoint { source: CheckpointError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address {address:?}"))]
    AddressParse {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Task join error.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },
}
