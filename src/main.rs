//! mcp-tool-host: MCP server exposing schema-validated tools, with deferred
//! and cancellable tool execution.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_tool_host::app::App;
use mcp_tool_host::config;
use mcp_tool_host::mcp::transport::{stdout_sender, StdioTransport};

/// How long to wait for queued replies to reach stdout on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// MCP server exposing tools and deferred tool execution over stdio.
#[derive(Parser, Debug)]
#[command(name = "mcp-tool-host")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries protocol messages.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the mcp-tool-host server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %cfg.server.name,
        "Starting mcp-tool-host server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        let (send, writer) = stdout_sender();

        let app = match App::new(&cfg, Some(send)) {
            Ok(app) => app,
            Err(e) => {
                error!(error = %e, "Failed to register tools");
                return Err(std::io::Error::other(e));
            }
        };

        info!("MCP server ready, waiting for client connection...");

        let mut transport = StdioTransport::new();
        let result = app.run(&mut transport).await;

        let dropped = app.shutdown();
        if dropped > 0 {
            info!(count = dropped, "Cancelled pending countdowns");
        }

        match tokio::time::timeout(FLUSH_TIMEOUT, writer).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "Failed to flush stdout"),
            Ok(Err(e)) => warn!(error = %e, "Writer task failed"),
            Err(_) => warn!("Timed out flushing pending messages"),
        }

        result
    });

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
