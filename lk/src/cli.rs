//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::network::{EffectiveType, NetworkQuality};

/// Loadkit - adaptive resource-loading orchestration
#[derive(Parser)]
#[command(
    name = "lk",
    about = "Drive and inspect the adaptive loading layer",
    version,
    after_help = generate_after_help()
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

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Page through a synthetic source the way a scrolling list would
    Simulate {
        /// Total items in the source
        #[arg(long, default_value_t = 45)]
        items: usize,

        /// Items per page (defaults to progressive.items-per-page)
        #[arg(long)]
        page_size: Option<usize>,

        /// Simulated network quality (fast, good, slow, unknown)
        #[arg(short, long, default_value = "good")]
        network: NetworkQuality,

        /// Base latency of each page fetch in milliseconds
        #[arg(long, default_value_t = 120)]
        latency_ms: u64,

        /// Page index whose first fetch fails
        #[arg(long)]
        fail_page: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Classify connection signals into a network quality
    Classify {
        /// Effective connection type (slow-2g, 2g, 3g, 4g)
        #[arg(short, long)]
        effective_type: Option<EffectiveType>,

        /// Downlink in Mbps
        #[arg(short, long)]
        downlink: Option<f64>,

        /// Round-trip time in milliseconds
        #[arg(short, long)]
        rtt: Option<u64>,

        /// The user asked for reduced data usage
        #[arg(long)]
        save_data: bool,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadkit")
        .join("logs")
        .join("loadkit.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}\n", get_log_path().display())
}

/// Output format for simulation results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
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
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
