// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `workflow-runner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "workflow-runner",
    version,
    about = "Run a DAG of update tasks, rerunning stale ones on a schedule.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Run a single cycle and exit with its result.
    #[arg(long)]
    pub once: bool,

    /// Root the cycles at this task instead of `[config].root`.
    #[arg(long, value_name = "NAME")]
    pub task: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WORKFLOW_RUNNER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the planned rounds, but don't execute any
    /// commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Ask the instance listening on the control address to stop, then exit.
    #[arg(long)]
    pub stop: bool,

    /// Control address, overriding `[config].rpc_addr`.
    #[arg(long, value_name = "ADDR")]
    pub rpc_addr: Option<String>,
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
