// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::loader::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `pipechain`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipechain",
    version,
    about = "Run the ingest -> transform -> verify chain on a schedule or when its input changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Pipechain.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Poll the change sensor once, run the chain if it triggered, print the
    /// run result as JSON and exit.
    #[arg(long)]
    pub once: bool,

    /// With `--once`: run the chain even if the sensor would skip.
    #[arg(long, requires = "once")]
    pub force: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPECHAIN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the chain, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
