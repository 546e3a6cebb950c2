//! base-editor-design-mcp: MCP server for base editor guide design
//!
//! Exposes the single and batch guide design tools as MCP tools over stdio.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use base_editor_design_mcp::config;
use base_editor_design_mcp::design::DesignTools;
use base_editor_design_mcp::mcp::server::McpServer;

/// MCP server for base editor guide design.
///
/// Runs the external guide design tools on behalf of AI assistants and
/// reports the output directories they create.
#[derive(Parser, Debug)]
#[command(name = "base-editor-design-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Directory the tools run in (overrides `working_root` in the config)
    #[arg(short = 'w', long, value_name = "DIR")]
    working_root: Option<PathBuf>,

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
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries MCP messages.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the base-editor-design-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    let workspace = match config::resolve_workspace(&cfg, args.working_root.as_deref()) {
        Ok(ws) => ws,
        Err(e) => {
            error!(error = %e, "Invalid working root");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting base-editor-design-mcp server"
    );

    let settings = cfg.tool_settings();
    info!(
        working_root = %workspace.root().display(),
        staging_dir = %workspace.staging_dir().display(),
        interpreter = %settings.interpreter,
        detection = ?settings.detection,
        staging = ?settings.staging,
        "Workspace configured"
    );

    let mut server = McpServer::new(DesignTools::new(workspace, settings));

    info!("MCP server ready, waiting for client connection...");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(server.run());

    // A tool call abandoned on shutdown may still be running on the blocking pool.
    runtime.shutdown_background();

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn verbosity_overrides_config_level() {
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "nonsense"), Level::WARN);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(3, true, "trace"), Level::ERROR);
    }
}
