//! CLI command implementations
//!
//! Tables come from JSON descriptions loaded into a `MemoryRelationSet`;
//! kernels come from the host device's builtin registry. Without
//! `--config`, the session uses the table's own chunk size.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::observability::{Logger, MetricsSnapshot, ObservationScope, Severity};
use crate::offload::HostDevice;
use crate::scan::{PlanConfig, ScanSession, SessionConfig};
use crate::storage::{MemoryRelationSet, RelationSet, TableSpec};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_row};

/// Parse arguments, configure logging and run the command against stdout
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let severity = Severity::parse(&cli.log_level)
        .ok_or_else(|| CliError::usage_error(format!("unknown log level \"{}\"", cli.log_level)))?;
    Logger::set_min_severity(severity);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_command(cli.command, &mut out)
}

/// Run the appropriate command based on CLI args
pub fn run_command<W: Write>(cmd: Command, out: &mut W) -> CliResult<()> {
    match cmd {
        Command::Scan {
            table,
            plan,
            config,
            metrics,
        } => scan(&table, &plan, config.as_deref(), metrics, out).map(|_| ()),
        Command::Explain { table, plan } => explain(&table, &plan, out),
    }
}

fn load_table(path: &Path) -> CliResult<(usize, Arc<dyn RelationSet>)> {
    let spec = TableSpec::load(path)?;
    let chunk_size = spec.chunk_size;
    let relset: Arc<dyn RelationSet> = Arc::new(MemoryRelationSet::from_spec(spec)?);
    Ok((chunk_size, relset))
}

/// Scan a table, writing one JSON array per visible row.
///
/// With `print_metrics`, a final `{"metrics": {...}}` line follows the rows.
pub fn scan<W: Write>(
    table_path: &Path,
    plan_path: &Path,
    config_path: Option<&Path>,
    print_metrics: bool,
    out: &mut W,
) -> CliResult<MetricsSnapshot> {
    let table = table_path.display().to_string();
    let mut scope = ObservationScope::with_fields("CLI_SCAN", &[("table", &table)]);

    match scan_rows(table_path, plan_path, config_path, out) {
        Ok(snapshot) => {
            scope.complete_with_fields(&[("rows", &snapshot.rows_emitted.to_string())]);
            if print_metrics {
                write_json(out, &json!({ "metrics": snapshot }))?;
            }
            Ok(snapshot)
        }
        Err(err) => {
            scope.fail(err.message());
            Err(err)
        }
    }
}

fn scan_rows<W: Write>(
    table_path: &Path,
    plan_path: &Path,
    config_path: Option<&Path>,
    out: &mut W,
) -> CliResult<MetricsSnapshot> {
    let (chunk_size, relset) = load_table(table_path)?;
    let plan = PlanConfig::load(plan_path)?;
    let config = match config_path {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::with_chunk_size(chunk_size),
    };

    let device = HostDevice::with_builtins();
    let mut session = ScanSession::open(relset, plan, config, Some(&device))?;

    loop {
        match session.next() {
            Ok(Some(row)) => write_row(out, &row)?,
            Ok(None) => break,
            Err(err) => {
                session.end();
                return Err(err.into());
            }
        }
    }
    out.flush()?;
    Ok(session.end())
}

/// Print the execution strategy of a plan as JSON
pub fn explain<W: Write>(table_path: &Path, plan_path: &Path, out: &mut W) -> CliResult<()> {
    let table = table_path.display().to_string();
    let mut scope = ObservationScope::with_fields("CLI_EXPLAIN", &[("table", &table)]);

    let result = (|| -> CliResult<()> {
        let (_, relset) = load_table(table_path)?;
        let plan = PlanConfig::load(plan_path)?;
        let strategy = ScanSession::describe(relset.as_ref(), &plan)?;
        write_json(out, &strategy)
    })();

    match &result {
        Ok(()) => scope.complete(),
        Err(err) => scope.fail(err.message()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const TABLE: &str = r#"{
        "name": "sales",
        "chunk_size": 8,
        "columns": [{"name": "qty", "type": "int32"}, {"name": "note", "type": "text"}],
        "existence": [{"base_rowid": 0, "rows": [1, 2]}],
        "records": [{"column": "qty", "base_rowid": 0, "values": [5, 6, null]}]
    }"#;

    #[test]
    fn test_scan_uses_table_chunk_size() {
        let dir = TempDir::new().unwrap();
        let table = write(&dir, "t.json", TABLE);
        let plan = write(&dir, "p.json", r#"[{"name": "predictable", "value": true}, {"name": "required_cols", "value": 1}]"#);

        let mut out = Vec::new();
        let snapshot = scan(&table, &plan, None, false, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[6,null]\n[null,null]\n");
        assert_eq!(snapshot.rows_emitted, 2);
    }

    #[test]
    fn test_unknown_option_fails() {
        let dir = TempDir::new().unwrap();
        let table = write(&dir, "t.json", TABLE);
        let plan = write(&dir, "p.json", r#"[{"name": "bogus", "value": 1}]"#);

        let err = scan(&table, &plan, None, false, &mut Vec::new()).unwrap_err();
        assert!(err.message().contains("SCAN_UNKNOWN_OPTION"));
    }

    #[test]
    fn test_explain() {
        let dir = TempDir::new().unwrap();
        let table = write(&dir, "t.json", TABLE);
        let plan = write(
            &dir,
            "p.json",
            r#"[{"name": "device_kernel", "value": "passthrough"}, {"name": "clause_cols", "value": 1}, {"name": "required_cols", "value": 1}]"#,
        );

        let mut out = Vec::new();
        explain(&table, &plan, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["mode"], "offload");
        assert_eq!(value["eager_cols"], json!(["qty"]));
        assert_eq!(value["pruned_cols"], json!(["note"]));
    }
}
