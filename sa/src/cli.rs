//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// SitAware - live situational-awareness display
#[derive(Parser)]
#[command(
    name = "sa",
    about = "Live situational-awareness display with ordered subsystem lifecycle",
    version = env!("CARGO_PKG_VERSION"),
    after_help = after_help(),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start up, run until interrupted, then shut down
    Run {
        /// Keep frames in memory instead of drawing on the terminal
        #[arg(long)]
        headless: bool,

        /// Shut down after this many seconds
        #[arg(short, long, value_name = "SECS")]
        duration: Option<u64>,

        /// Feed the blackboard from the built-in flight simulator
        #[arg(long, overrides_with = "no_simulator")]
        simulator: bool,

        /// Do not start the simulator
        #[arg(long = "no-simulator")]
        no_simulator: bool,
    },

    /// Print subsystem construction order and dependencies
    Plan,

    /// Show whether an instance is running
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

impl Command {
    /// Simulator override from `--simulator` / `--no-simulator`
    pub fn simulator_override(&self) -> Option<bool> {
        match self {
            Self::Run { simulator: true, .. } => Some(true),
            Self::Run { no_simulator: true, .. } => Some(false),
            _ => None,
        }
    }
}

/// Output format for the status command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text, json", s)),
        }
    }
}

/// Log file location
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sitaware")
        .join("logs")
        .join("sitaware.log")
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}
