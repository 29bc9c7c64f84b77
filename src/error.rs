//! Error types for skillbridge-mcp.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// The merged configuration did not deserialise into the typed tree.
    #[error("invalid configuration")]
    InvalidConfig(#[source] serde_json::Error),

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that can occur while running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The HTTP listener could not be bound or failed while serving.
    #[error("HTTP transport error on {addr}")]
    Http {
        /// The address the transport was bound to (or tried to bind).
        addr: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// TLS was requested but is not served by this binary.
    #[error(
        "use_https is enabled but TLS serving is not available; \
         terminate TLS upstream or disable http.use_https"
    )]
    TlsUnavailable,

    /// stdio transport I/O failure.
    #[error("stdio transport error")]
    Stdio(#[source] std::io::Error),
}
