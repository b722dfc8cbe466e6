//! CLI smoke tests for the memsee binary
//!
//! Spawns the binary against a temp store and checks exit codes and output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const HEAP: &str = r#"{"address": 1, "type": "list", "size": 72, "len": 2, "refs": [2, 3]}
{"address": 2, "type": "str", "size": 50, "value": "hello", "refs": []}
{"address": 3, "type": "int", "size": 28, "value": "42", "refs": [999]}
"#;

fn bin_path() -> String {
    std::env::var("CARGO_BIN_EXE_memsee").unwrap_or_else(|_| {
        let mut path = std::env::current_exe().unwrap();
        path.pop();
        path.pop();
        path.push("memsee");
        path.to_str().unwrap().to_string()
    })
}

fn memsee(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to start memsee binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn loaded_store(dir: &TempDir) -> String {
    let db = dir.path().join("heap.db");
    let dump = dir.path().join("heap.json");
    fs::write(&dump, HEAP).unwrap();

    let db = db.to_str().unwrap().to_string();
    assert!(memsee(&["create", &db]).status.success());
    let read = memsee(&["read", &db, dump.to_str().unwrap(), "--no-progress"]);
    assert!(read.status.success(), "read failed: {:?}", read);
    assert!(stdout(&read).contains("loaded 3 objects, 3 refs"));
    db
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_create_read_stats() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let output = memsee(&["stats", &db, "--output", "json"]);
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["tool"], "memsee");
    assert_eq!(response["data"]["objects"], 3);
    assert_eq!(response["data"]["references"], 3);
    assert_eq!(response["data"]["total_bytes"], 150);
    assert_eq!(response["data"]["roots"], 1);
}

#[test]
fn test_create_refuses_existing_store() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let output = memsee(&["create", &db]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    assert!(memsee(&["create", &db, "--force"]).status.success());
    let response = json(&memsee(&["stats", &db, "--output", "json"]));
    assert_eq!(response["data"]["objects"], 0);
}

#[test]
fn test_types_human_table() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let output = memsee(&["types", &db]);
    assert!(output.status.success());
    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "type  n");
    assert!(text.contains("(3 rows)"));
}

#[test]
fn test_query_json_argument() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let query = r#"{"from": {"collection": "objects"},
        "filter": {"kind": "binary", "op": "eq",
                   "left": {"kind": "column", "name": "type"},
                   "right": {"kind": "literal", "value": "str"}},
        "select": [{"expr": {"kind": "column", "name": "value"}}]}"#;
    let output = memsee(&["query", &db, query, "--output", "json"]);
    assert!(output.status.success());

    let response = json(&output);
    assert_eq!(response["data"]["row_count"], 1);
    assert_eq!(response["data"]["rows"][0]["value"], "hello");
}

#[test]
fn test_invalid_query_reports_error_code() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let query = r#"{"from": {"collection": "objects"},
        "select": [{"expr": {"kind": "column", "name": "colour"}}]}"#;
    let output = memsee(&["query", &db, query, "--output", "json"]);
    assert_eq!(output.status.code(), Some(1));

    let response = json(&output);
    assert_eq!(response["error"], "MSE-QRY-001");
    assert!(response["message"].as_str().unwrap().contains("colour"));
}

#[test]
fn test_named_address_in_parents() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    assert!(memsee(&["set", &db, "s", "2"]).status.success());
    let output = memsee(&["parents", &db, "$s", "--output", "json"]);
    assert!(output.status.success());

    let response = json(&output);
    assert_eq!(response["data"]["address"], 2);
    assert_eq!(response["data"]["objects"][0]["address"], 1);

    // Human output shows the name in place of the address
    let text = stdout(&memsee(&["info", &db, "0x2"]));
    assert!(text.contains("$s"));
}

#[test]
fn test_path_human() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let output = memsee(&["path", &db, "--from", "1", "--to", "3"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "1 list -> 3 int");
}

#[test]
fn test_backup_then_restore() {
    let dir = TempDir::new().unwrap();
    let db = loaded_store(&dir);

    let err = memsee(&["restore", &db, "--output", "json"]);
    assert_eq!(err.status.code(), Some(1));
    assert_eq!(json(&err)["error"], "MSE-SES-004");

    let output = memsee(&["backup", &db]);
    assert!(output.status.success());
    assert!(Path::new(&format!("{}.bak", db)).exists());
    assert_eq!(memsee(&["backup", &db]).status.code(), Some(1));

    assert!(memsee(&["set", &db, "later", "1"]).status.success());
    assert!(memsee(&["restore", &db]).status.success());

    let names = json(&memsee(&["names", &db, "--output", "json"]));
    assert_eq!(names["data"]["names"], serde_json::json!([]));
    let stats = json(&memsee(&["stats", &db, "--output", "json"]));
    assert_eq!(stats["data"]["objects"], 3);
}

#[test]
fn test_missing_store_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("missing.db");

    let output = memsee(&["stats", db.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!Path::new(&db).exists());
}

#[test]
fn test_unknown_command_prints_usage() {
    let output = memsee(&["frobnicate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage:"));
}

#[test]
fn test_version() {
    let output = memsee(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("memsee "));
}
