// crates/nimbus-cli/src/main.rs
// ============================================================================
// Module: Nimbus CLI Entry Point
// Description: Command dispatcher for the Nimbus MCP server.
// Purpose: Load configuration, bootstrap the pipeline, and serve transports.
// Dependencies: clap, nimbus-config, nimbus-mcp, tokio
// ============================================================================

//! ## Overview
//! The CLI wires configuration into the server bootstrap and runs the
//! selected transport. Exit codes are part of the contract: `0` for a normal
//! shutdown, `1` for configuration errors, `2` for initialization failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use nimbus_config::NimbusConfig;
use nimbus_config::ServerTransport;
use nimbus_mcp::Bootstrap;
use nimbus_mcp::serve_metrics;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 1;
/// Exit code for initialization failures.
const EXIT_INIT: u8 = 2;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Nimbus: cloud-infrastructure tools over the Model Context Protocol.
#[derive(Debug, Parser)]
#[command(name = "nimbus", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level CLI commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server on the configured transport.
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
    /// Print the registered tool names, one per line.
    Tools,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Dispatches the selected command.
fn run(cli: &Cli) -> Result<(), u8> {
    let config = load_config(cli)?;
    match cli.command {
        Command::CheckConfig => {
            emit_line("configuration ok");
            Ok(())
        }
        Command::Tools => {
            let bootstrap = build(&config)?;
            for definition in bootstrap.server.front().list_tools() {
                emit_line(&definition.name);
            }
            bootstrap.shutdown();
            Ok(())
        }
        Command::Serve => serve(&config),
    }
}

/// Loads and validates configuration, mapping failures to exit code 1.
fn load_config(cli: &Cli) -> Result<NimbusConfig, u8> {
    NimbusConfig::load(cli.config.as_deref()).map_err(|err| {
        emit_error(&format!("nimbus: {err}"));
        EXIT_CONFIG
    })
}

/// Bootstraps the pipeline, mapping failures to exit code 2.
fn build(config: &NimbusConfig) -> Result<Bootstrap, u8> {
    nimbus_mcp::build(config).map_err(|err| {
        emit_error(&format!("nimbus: {err}"));
        EXIT_INIT
    })
}

/// Runs the server on the configured transport until shutdown.
fn serve(config: &NimbusConfig) -> Result<(), u8> {
    let bootstrap = build(config)?;
    let runtime =
        tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(|err| {
            emit_error(&format!("nimbus: runtime construction failed: {err}"));
            EXIT_INIT
        })?;

    if config.metrics.enabled {
        let metrics = Arc::clone(&bootstrap.metrics);
        let port = config.metrics.port;
        runtime.spawn(async move {
            let _ = serve_metrics(metrics, port).await;
        });
    }
    let outcome = match config.server.transport {
        // The stdio loop is synchronous; the runtime keeps the metrics
        // listener alive in the background.
        ServerTransport::Stdio => bootstrap.server.serve_stdio(),
        ServerTransport::Http => runtime.block_on(Arc::clone(&bootstrap.server).serve_http()),
    };
    bootstrap.shutdown();
    runtime.shutdown_background();
    outcome.map_err(|err| {
        emit_error(&format!("nimbus: {err}"));
        EXIT_INIT
    })
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes one line to stdout.
fn emit_line(line: &str) {
    let _ = writeln!(std::io::stdout(), "{line}");
}

/// Writes one line to stderr.
fn emit_error(line: &str) {
    let _ = writeln!(std::io::stderr(), "{line}");
}
