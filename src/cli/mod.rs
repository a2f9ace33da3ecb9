//! CLI module for chunkscan
//!
//! Provides command-line interface for:
//! - scan: Run a scan and print visible rows as JSON arrays
//! - explain: Print how a plan would be executed

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, run, run_command, scan};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_row};
