//! OBD Cockpit CLI - control panel for the OBD cockpit backend
//!
//! Initializes the ELM327 adapter, reads the VIN, starts and stops backend
//! PID polling, and sends raw adapter commands.

mod config;
mod output;
mod shell;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cockpit_client::{ClientConfig, CockpitClient, Outcome, Panel, DEFAULT_CONNECT_TIMEOUT};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, MergedConfig};
use crate::output::ConsoleSink;

#[derive(Parser)]
#[command(name = "cockpit")]
#[command(author, version, about = "OBD Virtual Cockpit control panel")]
#[command(propagate_version = true)]
struct Cli {
    /// Backend URL [default: http://localhost:8000]
    #[arg(short, long, env = "COCKPIT_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "COCKPIT_CONFIG")]
    config: Option<PathBuf>,

    /// Request timeout in seconds (0 = wait indefinitely)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Hide "working" placeholders
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend, adapter and polling status
    Status,

    /// Run the adapter initialization sequence
    Init,

    /// Read the vehicle identification number
    Vin,

    /// Scan supported mode 01 PIDs
    Scan,

    /// Start or stop backend PID polling
    Poll {
        #[command(subcommand)]
        action: PollAction,
    },

    /// Send a raw command to the adapter (e.g. "ATRV", "010C")
    Command {
        /// Command text; words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Interactive control panel
    Shell,
}

#[derive(Subcommand)]
enum PollAction {
    /// Start polling
    Start {
        /// Vehicle VIN (omitted when empty)
        #[arg(long, default_value = "")]
        vin: String,

        /// Comma-separated PIDs, e.g. "010C, 0105"
        #[arg(long, default_value = "")]
        pids: String,

        /// Interval in seconds (1.0 when empty or invalid)
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        interval: String,
    },

    /// Stop polling
    Stop,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(cli.server.as_deref(), cli.timeout, cli.no_color);

    let is_shell = matches!(cli.command, Commands::Shell);
    let sink = Arc::new(ConsoleSink::new(merged.no_color, cli.quiet, is_shell));
    let client = create_client(&merged)?;
    let panel = Arc::new(Panel::new(client, sink, merged.panel));

    let outcome = match cli.command {
        Commands::Status => panel.fetch_status().await,
        Commands::Init => panel.init_adapter().await,
        Commands::Vin => panel.read_vin().await,
        Commands::Scan => panel.scan_pids().await,
        Commands::Poll { action } => match action {
            PollAction::Start {
                vin,
                pids,
                interval,
            } => panel.start_polling(&vin, &pids, &interval).await,
            PollAction::Stop => panel.stop_polling().await,
        },
        Commands::Command { text } => panel.send_command(&text.join(" ")).await,
        Commands::Shell => {
            shell::run(panel).await?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    Ok(exit_code(&outcome))
}

/// Create a cockpit client for the merged configuration
fn create_client(config: &MergedConfig) -> Result<CockpitClient> {
    let client_config = ClientConfig {
        timeout: config.timeout,
        connect_timeout: config
            .timeout
            .map_or(DEFAULT_CONNECT_TIMEOUT, |t| t.min(DEFAULT_CONNECT_TIMEOUT)),
    };
    CockpitClient::with_config(&config.server, client_config)
        .context("Failed to create cockpit client")
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
