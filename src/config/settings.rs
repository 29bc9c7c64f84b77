//! Configuration structures for serialisation and deserialisation.
//!
//! These structures map directly to the JSON configuration format. They are
//! both `Serialize` and `Deserialize`: environment defaults are rendered to a
//! JSON tree, deep-merged with user overrides, and read back as one
//! [`ServerConfig`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root server configuration.
///
/// Immutable after the merge step in [`crate::config::load_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name reported in `initialize` responses.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Server version reported in `initialize` responses.
    #[serde(default = "default_server_version")]
    pub server_version: String,

    /// MCP protocol version this server speaks.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// Seconds between expired-session sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Seconds a session stays valid after `initialize`.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,

    /// `tools/list` pagination settings.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// stdio transport settings.
    #[serde(default)]
    pub stdio: StdioConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_version: default_server_version(),
            protocol_version: default_protocol_version(),
            cleanup_interval: default_cleanup_interval(),
            session_timeout: default_session_timeout(),
            pagination: PaginationConfig::default(),
            http: HttpConfig::default(),
            stdio: StdioConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS is enabled without certificate paths, if the
    /// auth type is unknown, or if no transport is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.use_https && (self.http.cert_file.is_none() || self.http.key_file.is_none()) {
            return Err(ConfigError::ValidationError {
                message: "http.use_https requires both http.cert_file and http.key_file"
                    .to_string(),
            });
        }

        if self.http.auth.enabled && self.http.auth.auth_type != "api_key" {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "unsupported http.auth.type '{}'; only 'api_key' is available",
                    self.http.auth.auth_type
                ),
            });
        }

        if !self.http.enabled && !self.stdio.enabled {
            return Err(ConfigError::ValidationError {
                message: "at least one transport (http or stdio) must be enabled".to_string(),
            });
        }

        Ok(())
    }
}

/// Pagination settings for `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationConfig {
    /// Number of tool descriptors per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Whether the HTTP transport is started.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether the listener should use TLS.
    #[serde(default)]
    pub use_https: bool,

    /// Path to the TLS certificate (required when `use_https`).
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Path to the TLS private key (required when `use_https`).
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Allowed CORS origins. `["*"]` allows any origin; empty disables CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            use_https: false,
            cert_file: None,
            key_file: None,
            cors_origins: default_cors_origins(),
            auth: AuthConfig::default(),
        }
    }
}

/// HTTP authentication settings.
///
/// Only the `api_key` check point is implemented; the field layout leaves room
/// for other schemes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Whether requests to `/mcp` must present a key.
    #[serde(default)]
    pub enabled: bool,

    /// Authentication scheme name.
    #[serde(rename = "type", default = "default_auth_type")]
    pub auth_type: String,

    /// Accepted API keys.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_type: default_auth_type(),
            api_keys: Vec::new(),
        }
    }
}

/// stdio transport settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdioConfig {
    /// Whether the stdio transport is started.
    #[serde(default)]
    pub enabled: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file path. `None` logs to stderr only.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_server_name() -> String {
    "Skillbridge MCP Server".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_protocol_version() -> String {
    "2025-03-26".to_string()
}

const fn default_cleanup_interval() -> u64 {
    300
}

const fn default_session_timeout() -> u64 {
    3600
}

const fn default_page_size() -> usize {
    100
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_auth_type() -> String {
    "api_key".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}
