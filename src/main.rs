//! skillbridge-mcp: MCP server exposing a skill registry as JSON-RPC tools.
//!
//! Serves the registered skills over HTTP/SSE and line-delimited stdio,
//! selected by configuration. Logs go to stderr (or a file) so stdout stays
//! a clean protocol channel for the stdio transport.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use skillbridge_mcp::config::{self, Environment, LoggingConfig};
use skillbridge_mcp::mcp::server::McpServer;
use skillbridge_mcp::skills::{require_i64, require_str, InMemoryRegistry, SkillMetadata};

/// MCP server exposing a skill registry as JSON-RPC tools.
///
/// Speaks JSON-RPC 2.0 over HTTP/SSE and stdio; which transports run is
/// decided by the configuration for the chosen environment.
#[derive(Parser, Debug)]
#[command(name = "skillbridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Deployment environment selecting configuration defaults
    #[arg(short, long, value_enum, default_value_t = Environment::Development)]
    environment: Environment,

    /// Enable the stdio transport regardless of configuration
    #[arg(long)]
    stdio: bool,

    /// Disable the HTTP transport regardless of configuration
    #[arg(long)]
    no_http: bool,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments and the configured level.
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber, writing to the configured log file
/// when one is set and stderr otherwise.
fn init_tracing(level: Level, logging: &LoggingConfig) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }) {
        Some(file) => builder.with_writer(Arc::new(file)).with_ansi(false).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}

/// Registers the built-in demonstration skills.
fn builtin_skills() -> InMemoryRegistry {
    let mut registry = InMemoryRegistry::new();

    registry.register(
        "echo",
        SkillMetadata::new("Echoes the given text back to the caller")
            .with_param("text", "str", "Text to echo")
            .with_required(&["text"])
            .with_tags(&["read_only", "idempotent"]),
        |args| Ok(json!(require_str(args, "text")?)),
    );

    registry.register(
        "add",
        SkillMetadata::new("Adds two integers")
            .with_param("a", "int", "First operand")
            .with_param("b", "int", "Second operand")
            .with_required(&["a", "b"])
            .with_tags(&["read_only", "idempotent"]),
        |args| Ok(json!(require_i64(args, "a")? + require_i64(args, "b")?)),
    );

    registry.register(
        "current_time",
        SkillMetadata::new("Returns the current UTC time as an RFC 3339 string")
            .with_tags(&["read_only"]),
        |_| Ok(json!(chrono::Utc::now().to_rfc3339())),
    );

    registry
}

/// Resolves when a shutdown signal arrives (SIGINT/SIGTERM, or Ctrl+C on
/// non-Unix platforms).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}

/// Entry point for the skillbridge-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let mut cfg = match config::load_config(args.environment, args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if args.config.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // CLI transport flags override the merged configuration.
    if args.stdio {
        cfg.stdio.enabled = true;
    }
    if args.no_http {
        cfg.http.enabled = false;
    }
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level, &cfg.logging);

    // -v/-q beat the configured level; fold the effective level back into
    // the config so internal-error diagnostics follow it too.
    cfg.logging.level = log_level.to_string().to_lowercase();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?args.environment,
        "Starting skillbridge-mcp server"
    );

    let server = Arc::new(McpServer::new(cfg, Arc::new(builtin_skills())));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        if let Err(e) = Arc::clone(&server).start() {
            error!(error = %e, "Server failed to start");
            return ExitCode::FAILURE;
        }

        wait_for_shutdown().await;
        server.stop().await;

        info!("Server shut down gracefully");
        ExitCode::SUCCESS
    })
}
