//! CLI argument definitions using clap
//!
//! Commands:
//! - chunkscan scan --table <path> --plan <path> [--config <path>] [--metrics]
//! - chunkscan explain --table <path> --plan <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chunkscan - chunked columnar table scans with offloaded predicates
#[derive(Parser, Debug)]
#[command(name = "chunkscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity: trace, info, warn, error, fatal
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a table and print one JSON array per visible row
    Scan {
        /// Path to the JSON table description
        #[arg(long)]
        table: PathBuf,

        /// Path to the JSON plan option list
        #[arg(long)]
        plan: PathBuf,

        /// Path to the JSON session configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the scan's counters after the last row
        #[arg(long)]
        metrics: bool,
    },

    /// Print how a plan would be executed without scanning
    Explain {
        /// Path to the JSON table description
        #[arg(long)]
        table: PathBuf,

        /// Path to the JSON plan option list
        #[arg(long)]
        plan: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
