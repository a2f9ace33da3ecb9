//! JSON output for CLI commands
//!
//! - One JSON value per line
//! - UTF-8 only

use std::io::Write;

use serde::Serialize;

use crate::scan::Row;

use super::errors::CliResult;

/// Write one row as a JSON array
pub fn write_row<W: Write>(out: &mut W, row: &Row) -> CliResult<()> {
    serde_json::to_writer(&mut *out, &row.to_json())?;
    writeln!(out)?;
    Ok(())
}

/// Write any serializable value as one JSON line
pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
