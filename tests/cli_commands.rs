//! CLI command tests
//!
//! Commands run against JSON files in a temp directory and write to an
//! in-memory buffer.

use std::fs;
use std::path::PathBuf;

use chunkscan::cli::{run_command, CliErrorCode, Command};
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn table(kind: &str) -> Value {
    json!({
        "name": "sales",
        "kind": kind,
        "chunk_size": 16,
        "columns": [
            {"name": "qty", "type": "int32"},
            {"name": "price", "type": "float64"},
            {"name": "note", "type": "text", "dropped": true}
        ],
        "existence": [
            {"base_rowid": 0, "rows": [0, 1, 15]},
            {"base_rowid": 32, "rows": [8]}
        ],
        "records": [
            {"column": "qty", "base_rowid": 0, "values": [3, 4]},
            {"column": "qty", "base_rowid": 40, "values": [9]},
            {"column": "price", "base_rowid": 0, "values": [1.5, null, 2.5]}
        ]
    })
}

fn lines(out: &[u8]) -> Vec<Value> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_scan_prints_rows_and_metrics() {
    let dir = TempDir::new().unwrap();
    let table = write_file(&dir, "table.json", &table("managed_columnar"));
    let plan = write_file(
        &dir,
        "plan.json",
        &json!([
            {"name": "device_kernel", "value": "passthrough"},
            {"name": "clause_cols", "value": 1},
            {"name": "required_cols", "value": 1},
            {"name": "required_cols", "value": 2},
            {"name": "required_cols", "value": -2}
        ]),
    );

    let mut out = Vec::new();
    run_command(
        Command::Scan {
            table,
            plan,
            config: None,
            metrics: true,
        },
        &mut out,
    )
    .unwrap();

    let lines = lines(&out);
    assert_eq!(
        &lines[..4],
        &[
            json!([3, 1.5, null]),
            json!([4, null, null]),
            json!([null, null, null]),
            json!([9, null, null]),
        ]
    );
    assert_eq!(lines[4]["metrics"]["rows_emitted"], 4);
    assert_eq!(lines[4]["metrics"]["chunks_loaded"], 2);
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_scan_with_config_file() {
    let dir = TempDir::new().unwrap();
    let table = write_file(&dir, "table.json", &table("managed_columnar"));
    let plan = write_file(
        &dir,
        "plan.json",
        &json!([{"name": "predictable", "value": true}, {"name": "required_cols", "value": 1}]),
    );
    let config = write_file(
        &dir,
        "config.json",
        &json!({"chunk_size": 16, "max_async_chunks": 1}),
    );

    let mut out = Vec::new();
    run_command(
        Command::Scan {
            table,
            plan,
            config: Some(config),
            metrics: false,
        },
        &mut out,
    )
    .unwrap();
    assert_eq!(lines(&out).len(), 4);
}

#[test]
fn test_mismatched_chunk_size_fails() {
    let dir = TempDir::new().unwrap();
    let table = write_file(&dir, "table.json", &table("managed_columnar"));
    let plan = write_file(
        &dir,
        "plan.json",
        &json!([{"name": "predictable", "value": true}]),
    );
    let config = write_file(&dir, "config.json", &json!({"chunk_size": 64}));

    let err = run_command(
        Command::Scan {
            table,
            plan,
            config: Some(config),
            metrics: false,
        },
        &mut Vec::new(),
    )
    .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ScanFailed);
    assert!(err.message().contains("SCAN_LAYOUT_MISMATCH"));
}

#[test]
fn test_foreign_table_rejected() {
    let dir = TempDir::new().unwrap();
    let table = write_file(&dir, "table.json", &table("foreign"));
    let plan = write_file(
        &dir,
        "plan.json",
        &json!([{"name": "predictable", "value": true}]),
    );

    let err = run_command(
        Command::Scan {
            table,
            plan,
            config: None,
            metrics: false,
        },
        &mut Vec::new(),
    )
    .unwrap_err();
    assert!(err.message().contains("SCAN_WRONG_OBJECT_KIND"));
    assert!(err.message().contains("sales"));
}

#[test]
fn test_dropped_required_column_rejected() {
    let dir = TempDir::new().unwrap();
    let table = write_file(&dir, "table.json", &table("managed_columnar"));
    let plan = write_file(
        &dir,
        "plan.json",
        &json!([{"name": "predictable", "value": true}, {"name": "required_cols", "value": 3}]),
    );

    let err = run_command(
        Command::Explain { table, plan },
        &mut Vec::new(),
    )
    .unwrap_err();
    assert!(err.message().contains("SCAN_INVALID_CONFIG"));
    assert!(err.message().contains("note"));
}

#[test]
fn test_explain_all_visible() {
    let dir = TempDir::new().unwrap();
    let table = write_file(&dir, "table.json", &table("managed_columnar"));
    let plan = write_file(
        &dir,
        "plan.json",
        &json!([{"name": "predictable", "value": true}, {"name": "required_cols", "value": 2}]),
    );

    let mut out = Vec::new();
    run_command(Command::Explain { table, plan }, &mut out).unwrap();
    let strategy = &lines(&out)[0];
    assert_eq!(strategy["relation"], "sales");
    assert_eq!(strategy["mode"], "all_visible");
    assert_eq!(strategy["cached_cols"], json!(["price"]));
    assert_eq!(strategy["pruned_cols"], json!(["qty", "note"]));
}

#[test]
fn test_missing_table_file() {
    let dir = TempDir::new().unwrap();
    let plan = write_file(&dir, "plan.json", &json!([]));
    let err = run_command(
        Command::Explain {
            table: dir.path().join("absent.json"),
            plan,
        },
        &mut Vec::new(),
    )
    .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::TableError);
}
