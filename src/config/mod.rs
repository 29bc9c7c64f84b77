//! Configuration loading, environment defaults and merging.
//!
//! Configuration is assembled in three steps:
//!
//! 1. Environment defaults ([`default_config`]) for the chosen
//!    [`Environment`].
//! 2. A deep merge with user overrides ([`merge_configs`]): nested objects
//!    merge key-by-key, leaf values from the override win.
//! 3. Deserialisation into the typed [`ServerConfig`] tree plus validation.
//!
//! # Configuration File Locations
//!
//! The override file is searched in the following order:
//!
//! 1. Path specified via the `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.skillbridge-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.skillbridge-mcp\config.json`
//!
//! Unlike the CLI flag, a missing default file is not an error: the
//! environment defaults are used as-is.

mod settings;

pub use settings::{
    AuthConfig, HttpConfig, LoggingConfig, PaginationConfig, ServerConfig, StdioConfig,
};

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

/// Deployment environment selecting a block of configuration defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Environment {
    /// Local development: HTTP on localhost, permissive CORS, no auth.
    #[default]
    Development,
    /// Production: all interfaces, TLS and auth expected, restricted CORS.
    Production,
    /// Testing: alternate port, stdio enabled, debug logging.
    Testing,
}

/// Returns the default configuration for an environment.
#[must_use]
pub fn default_config(environment: Environment) -> ServerConfig {
    let mut config = ServerConfig::default();

    match environment {
        Environment::Development => {}
        Environment::Production => {
            config.http.host = "0.0.0.0".to_string();
            config.http.use_https = true;
            config.http.cert_file = Some(PathBuf::from("cert.pem"));
            config.http.key_file = Some(PathBuf::from("key.pem"));
            config.http.cors_origins = Vec::new();
            config.http.auth.enabled = true;
            config.logging.level = "warn".to_string();
            config.logging.file = Some(PathBuf::from("mcp_server.log"));
        }
        Environment::Testing => {
            config.http.port = 8001;
            config.stdio.enabled = true;
            config.logging.level = "debug".to_string();
        }
    }

    config
}

/// Deep-merges `overrides` into `base` and returns the typed result.
///
/// Nested JSON objects merge key-by-key; any other value in `overrides`
/// replaces the base value wholesale.
///
/// # Errors
///
/// Returns an error if the merged tree does not deserialise into
/// [`ServerConfig`] or fails validation.
pub fn merge_configs(base: &ServerConfig, overrides: Value) -> Result<ServerConfig, ConfigError> {
    let mut tree = serde_json::to_value(base).map_err(ConfigError::InvalidConfig)?;
    merge_values(&mut tree, overrides);

    let config: ServerConfig =
        serde_json::from_value(tree).map_err(ConfigError::InvalidConfig)?;
    config.validate()?;
    Ok(config)
}

/// Recursive key-by-key merge of JSON objects; override leaves win.
fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => *target_slot = source_value,
    }
}

/// Returns the default configuration directory.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".skillbridge-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration for `environment`, applying overrides from a file.
///
/// If `path` is `None`, the platform default location is tried; when that file
/// does not exist the environment defaults are returned unchanged. An explicit
/// `path` that does not exist is an error.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the merged
/// configuration is invalid.
pub fn load_config(
    environment: Environment,
    path: Option<&Path>,
) -> Result<ServerConfig, ConfigError> {
    let base = default_config(environment);

    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                base.validate()?;
                return Ok(base);
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let overrides: Value = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    merge_configs(&base, overrides)
}
