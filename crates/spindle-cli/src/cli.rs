//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::{CliError, CliResult};

/// Spindle: a queue-driven optical disc ripping pipeline.
#[derive(Debug, Parser)]
#[command(name = "spindle", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file. Overlaid on built-in defaults
    /// and overlaid by `SPINDLE_`-prefixed environment variables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon loop: poll for `identified` queue items and drive
    /// them through the ripping stage until a shutdown signal arrives.
    Run,
    /// Check binary presence, cache/staging root writability, and queue
    /// connectivity without running the daemon loop.
    Preflight,
    /// Configuration file management.
    Config {
        /// Selected configuration subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print built-in configuration defaults as TOML, or write them to a
    /// file with `--output`.
    Init {
        /// Destination file. Prints to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Overwrite an existing destination file.
        #[arg(long)]
        force: bool,
    },
    /// Load the layered configuration and report whether it validates.
    Check,
}

/// Parse arguments and dispatch to the selected command.
///
/// # Errors
///
/// Returns an error if the command fails; the caller maps it to a
/// process exit code.
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run => run_daemon(cli.config.as_deref()).await,
        Command::Preflight => run_preflight(cli.config.as_deref()).await,
        Command::Config { command } => run_config(command, cli.config.as_ref()),
    }
}

async fn run_daemon(config_path: Option<&std::path::Path>) -> CliResult<()> {
    let config = spindle_config::load(config_path)?;
    init_logging(&config)?;

    let pipeline = crate::bootstrap::build_pipeline(&config).await?;
    crate::daemon::run(pipeline, config.telemetry.metrics_addr.as_deref()).await
}

async fn run_preflight(config_path: Option<&std::path::Path>) -> CliResult<()> {
    let config = spindle_config::load(config_path)?;
    let results = crate::preflight::run(&config).await;

    let mut all_ok = true;
    for result in &results {
        all_ok &= result.ok;
        let status = if result.ok { "ok" } else { "FAIL" };
        if result.detail.is_empty() {
            println!("[{status}] {}", result.name);
        } else {
            println!("[{status}] {}: {}", result.name, result.detail);
        }
    }

    if all_ok {
        Ok(())
    } else {
        Err(CliError::failure(anyhow::anyhow!("one or more preflight checks failed")))
    }
}

fn run_config(command: ConfigCommand, config_path: Option<&PathBuf>) -> CliResult<()> {
    match command {
        ConfigCommand::Init { output, force } => crate::commands::config::init(output.as_deref(), force),
        ConfigCommand::Check => crate::commands::config::check(config_path),
    }
}

fn init_logging(config: &spindle_config::PipelineConfig) -> CliResult<()> {
    let format = spindle_telemetry::LogFormat::from_config(config.telemetry.log_format.as_deref());
    let logging_config = spindle_telemetry::LoggingConfig {
        level: &config.telemetry.log_filter,
        format,
        build_sha: option_env!("SPINDLE_BUILD_SHA").unwrap_or("dev"),
    };
    spindle_telemetry::init_logging(&logging_config).map_err(|err| CliError::failure(anyhow::anyhow!(err)))
}
