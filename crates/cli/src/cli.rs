//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dreceiver - distributed stream receiver node
#[derive(Parser, Debug)]
#[command(
    name = "dreceiver",
    author,
    version,
    about = "Distributed stream receiver node",
    long_about = "Accepts a fixed number of upstream sender connections over TCP or a \n\
                  Unix socket, performs the destination handshake, acknowledges batches \n\
                  of items and forwards them to the configured output channels."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DRECEIVER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "DRECEIVER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the receiver until every expected sender has finished
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "dreceiver.toml", env = "DRECEIVER_CONFIG")]
    pub config: PathBuf,

    /// Override the endpoint address (`ip:port` or socket path)
    #[arg(long, env = "DRECEIVER_BIND")]
    pub bind: Option<String>,

    /// Override the number of expected sender connections
    #[arg(long, env = "DRECEIVER_INPUT_CHANNELS")]
    pub input_channels: Option<usize>,

    /// Receiver timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "DRECEIVER_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without binding
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9464", env = "DRECEIVER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "dreceiver.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "dreceiver.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the routing table
    #[arg(long)]
    pub routing: bool,

    /// Show output channel configuration
    #[arg(long)]
    pub outputs: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
