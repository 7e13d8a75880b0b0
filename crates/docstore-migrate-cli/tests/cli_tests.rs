//! CLI integration tests for docstore-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes for various error conditions, and a full migration between
//! JSON snapshot files.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Environment variables the binary reads as overrides.
const OVERRIDE_VARS: &[&str] = &[
    "DATABASE",
    "CONTAINER",
    "SOURCE_PATH",
    "TARGET_PATH",
    "BATCH_SIZE",
    "MAX_RETRIES",
    "SANITIZE",
    "WORKERS",
];

/// Get a command for the docstore-migrate binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("docstore-migrate").unwrap();
    for var in OVERRIDE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn snapshot(partition_key: &str, documents: Value) -> Value {
    json!({
        "databases": {
            "shop": {
                "collections": {
                    "orders": {
                        "partition_key": {"paths": [partition_key]},
                        "documents": documents
                    }
                }
            }
        }
    })
}

/// Workspace with a config pointing at `source.json` and `target.json`.
fn workspace(source: &Value) -> TempDir {
    let dir = TempDir::new().unwrap();
    write_json(&dir.path().join("source.json"), source);
    std::fs::write(
        dir.path().join("config.yaml"),
        "source:\n  path: source.json\ntarget:\n  path: target.json\n",
    )
    .unwrap();
    dir
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--database"))
        .stdout(predicate::str::contains("--container"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--sanitize"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("[default: migration_summary.json]"));
}

#[test]
fn test_run_help_lists_env_overrides() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[env: SOURCE_PATH="))
        .stdout(predicate::str::contains("[env: BATCH_SIZE="));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("docstore-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_in_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shutdown-timeout"))
        .stdout(predicate::str::contains("[default: 60]"))
        .stdout(predicate::str::contains("--progress"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--state-file"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_log_flags_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7); // EXIT_IO_ERROR - file not found
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1); // EXIT_CONFIG_ERROR
}

#[test]
fn test_missing_store_path_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  type: json_file").unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  type: memory").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source.path is required"));
}

#[test]
fn test_env_override_fills_missing_path() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "source:\n  type: json_file\ntarget:\n  type: memory\n",
    )
    .unwrap();

    cmd()
        .current_dir(dir.path())
        .env("SOURCE_PATH", "source.json")
        .args(["validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation completed successfully"));
}

#[test]
fn test_container_without_database_exits_with_code_1() {
    let dir = workspace(&snapshot("/customer", json!([])));
    cmd()
        .current_dir(dir.path())
        .args(["run", "--container", "orders"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("requires migration.database"));
}

#[test]
fn test_resume_requires_state_file() {
    let dir = workspace(&snapshot("/customer", json!([])));
    cmd()
        .current_dir(dir.path())
        .args(["resume"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--state-file is required"));
}

// =============================================================================
// End-to-End Tests
// =============================================================================

#[test]
fn test_health_check_json_files() {
    let dir = workspace(&snapshot("/customer", json!([])));
    cmd()
        .current_dir(dir.path())
        .args(["health-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Health Check Results:"))
        .stdout(predicate::str::contains("HEALTHY"));
}

#[test]
fn test_run_migrates_snapshot_and_writes_summary() {
    let dir = workspace(&snapshot(
        "/customer",
        json!([
            {"id": "o1", "customer": "c1", "total": 10, "_etag": "\"src-1\""},
            {"id": "o2", "customer": "c2", "total": 20},
            {"id": "o3", "customer": null, "total": 30}
        ]),
    ));

    cmd()
        .current_dir(dir.path())
        .args(["run", "--summary", "summary.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 inserted"));

    let target = read_json(&dir.path().join("target.json"));
    let orders = &target["databases"]["shop"]["collections"]["orders"];
    assert_eq!(orders["partition_key"]["paths"], json!(["/customer"]));
    let documents = orders["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 2);
    assert!(documents.iter().all(|d| d["_etag"] != json!("\"src-1\"")));

    let summary = read_json(&dir.path().join("summary.json"));
    assert_eq!(summary["status"], json!("completed"));
    assert_eq!(summary["inserted"], json!(2));
    assert_eq!(summary["errors"], json!(1));
    assert_eq!(summary["databases"]["shop"][0]["collection"], json!("shop/orders"));
}

#[test]
fn test_document_without_id_does_not_block_the_run() {
    let dir = workspace(&snapshot(
        "/customer",
        json!([{"id": "o1", "customer": "c1"}, {"customer": "c2", "total": 5}]),
    ));

    cmd()
        .current_dir(dir.path())
        .args(["run"])
        .assert()
        .success();

    let summary = read_json(&dir.path().join("migration_summary.json"));
    assert_eq!(summary["inserted"], json!(1));
    assert_eq!(summary["errors"], json!(1));
}

#[test]
fn test_second_run_skips_everything() {
    let dir = workspace(&snapshot(
        "/customer",
        json!([{"id": "o1", "customer": "c1"}, {"id": "o2", "customer": "c1"}]),
    ));

    cmd()
        .current_dir(dir.path())
        .args(["run"])
        .assert()
        .success();

    cmd()
        .current_dir(dir.path())
        .args(["--output-json", "run"])
        .assert()
        .success();

    let summary = read_json(&dir.path().join("migration_summary.json"));
    assert_eq!(summary["inserted"], json!(0));
    assert_eq!(summary["updated"], json!(0));
    assert_eq!(summary["skipped"], json!(2));
}

#[test]
fn test_partition_key_mismatch_exits_with_code_3() {
    let dir = workspace(&snapshot("/customer", json!([{"id": "o1", "customer": "c1"}])));
    write_json(&dir.path().join("target.json"), &snapshot("/region", json!([])));

    cmd()
        .current_dir(dir.path())
        .args(["run"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Partition key mismatch"));

    let target = read_json(&dir.path().join("target.json"));
    assert_eq!(
        target["databases"]["shop"]["collections"]["orders"]["documents"],
        json!([])
    );
    let summary = read_json(&dir.path().join("migration_summary.json"));
    assert_eq!(summary["status"], json!("failed"));
}

#[test]
fn test_validate_reports_count_difference() {
    let dir = workspace(&snapshot("/customer", json!([{"id": "o1", "customer": "c1"}])));
    write_json(&dir.path().join("target.json"), &snapshot("/customer", json!([])));

    cmd()
        .current_dir(dir.path())
        .args(["validate"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("DIFF shop/orders"));
}

#[test]
fn test_run_then_resume_with_state_file() {
    let dir = workspace(&snapshot("/customer", json!([{"id": "o1", "customer": "c1"}])));

    cmd()
        .current_dir(dir.path())
        .args(["--state-file", "state.json", "run"])
        .assert()
        .success();
    assert!(dir.path().join("state.json").exists());

    cmd()
        .current_dir(dir.path())
        .args(["--state-file", "state.json", "resume", "--summary", "resumed.json"])
        .assert()
        .success();

    let summary = read_json(&dir.path().join("resumed.json"));
    assert_eq!(summary["databases"]["shop"][0]["status"], json!("skipped"));
}

#[test]
fn test_sanitized_run_replaces_sensitive_fields() {
    let dir = workspace(&snapshot(
        "/customer",
        json!([{"id": "p1", "customer": "c1", "firstName": "Ada", "email": "ada@example.com"}]),
    ));

    cmd()
        .current_dir(dir.path())
        .env("SANITIZE", "true")
        .args(["run"])
        .assert()
        .success();

    let target = read_json(&dir.path().join("target.json"));
    let doc = &target["databases"]["shop"]["collections"]["orders"]["documents"][0];
    assert_eq!(doc["id"], json!("p1"));
    assert_eq!(doc["customer"], json!("c1"));
    assert_ne!(doc["firstName"], json!("Ada"));
    assert_ne!(doc["email"], json!("ada@example.com"));
}
