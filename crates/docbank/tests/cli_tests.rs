//! CLI integration tests.
//!
//! These tests exercise the CLI commands end-to-end with the in-memory
//! driver, so no CouchDB server is needed.

use std::process::{Command, Output};
use tempfile::TempDir;

/// Get the path to the docbank binary.
fn binary_path() -> &'static str {
    env!("CARGO_BIN_EXE_docbank")
}

/// Run docbank in an empty directory so no project config is picked up.
fn run(args: &[&str]) -> Output {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    Command::new(binary_path())
        .args(args)
        .current_dir(temp_dir.path())
        .env_remove("DOCBANK_CONFIG_CONTENT")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_help_command() {
    let output = run(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("key-value storage"));
    assert!(stdout.contains("--driver"));
    assert!(stdout.contains("read-all"));
}

#[test]
fn test_version_flag() {
    let output = run(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("docbank"));
}

#[test]
fn test_ping_memory_driver() {
    let output = run(&["--driver", "memory", "ping"]);

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("ping prints JSON");
    assert_eq!(report["driver"], "memory");
    assert_eq!(report["ok"], true);
}

#[test]
fn test_create_prints_stored_value() {
    let output = run(&["--driver", "memory", "create", "user", "1", r#"{"name":"ada"}"#]);

    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("create prints JSON");
    assert_eq!(value, serde_json::json!({"name": "ada"}));
}

#[test]
fn test_read_missing_fails() {
    let output = run(&["--driver", "memory", "read", "user", "1"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No such user: 1"));
}

#[test]
fn test_invalid_json_value_fails() {
    let output = run(&["--driver", "memory", "save", "user", "1", "{oops"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid JSON value"));
}

#[test]
fn test_search_and_read_all_on_empty_store() {
    let output = run(&["--driver", "memory", "search", "user", "--where", "a.b=5"]);
    assert!(output.status.success());
    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).expect("search prints JSON");
    assert_eq!(hits, serde_json::json!([]));

    let output = run(&["--driver", "memory", "read-all", "user", "1", "2"]);
    assert!(output.status.success());
    let values: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("read-all prints JSON");
    assert_eq!(values, serde_json::json!({"1": null, "2": null}));
}

#[test]
fn test_config_command() {
    let output = run(&["--database", "app", "--password", "secret", "config"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration sources"));
    assert!(stdout.contains(r#""database": "app""#));
    assert!(!stdout.contains("secret"));
}

#[test]
fn test_unreachable_couchdb_fails() {
    let output = run(&[
        "--location",
        "http://127.0.0.1:1",
        "--database",
        "app",
        "ping",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CouchDB cannot connect to database app at http://127.0.0.1:1"));
}
