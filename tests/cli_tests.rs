//! Binary tests for the cuelog and cuelog-server executables
//!
//! These run the built binaries as subprocesses to cover the entry points.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const TEMPLATE_CSV: &str = "Series Title,Night Shift\n\
Season,2\n\
Episode Number,7\n\
Producer,North Light\n\
Date,2024-05-01\n\
Notes,none\n\
TCR In,TCR Out,Title\n\
00:00:01:00,00:00:05:00,Opening\n";

fn cuelog() -> Command {
    let mut cmd = Command::cargo_bin("cuelog").unwrap();
    // Keep the developer's environment out of the run
    cmd.env_remove("CUELOG_CONFIG")
        .env_remove("CUELOG_METADATA_ROWS");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_help_lists_commands() {
    cuelog()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_version() {
    cuelog()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_command_fails() {
    cuelog().arg("transcribe").assert().failure();
}

// ═══════════════════════════════════════════════════════════════════════════
// PARSE COMMAND
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_parse_to_stdout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("episode.csv");
    fs::write(&input, TEMPLATE_CSV).unwrap();

    cuelog()
        .arg("parse")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"header\""))
        .stdout(predicate::str::contains("Opening"));
}

#[test]
fn test_parse_to_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("episode.csv");
    let output = dir.path().join("episode.json");
    fs::write(&input, TEMPLATE_CSV).unwrap();

    cuelog()
        .arg("parse")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Parse Complete"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["header"][2], "Title");
    assert_eq!(json["metadata"].as_array().unwrap().len(), 6);
}

#[test]
fn test_parse_with_metadata_rows_flag() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("short.csv");
    fs::write(&input, "Show,Night Shift\nTitle,Composer\nIntro,A. Writer\n").unwrap();

    cuelog()
        .args(["parse", "--metadata-rows", "1"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("A. Writer"));
}

#[test]
fn test_parse_unsupported_file_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("notes.txt");
    fs::write(&input, "not a cue sheet").unwrap();

    cuelog()
        .arg("parse")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file type"));
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPORT COMMAND
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_export_csv() {
    let dir = TempDir::new().unwrap();
    let request = dir.path().join("request.json");
    let output = dir.path().join("out.csv");
    fs::write(
        &request,
        r#"{
            "headerRows": [["Series Title", "Night Shift"]],
            "markers": [{"tcrIn": 61.0, "title": "Chase", "usage": ["BV", "SRC"]}],
            "fieldsToExport": ["tcrIn", "title", "usage"],
            "fieldLabels": {"tcrIn": "TCR In", "title": "Title", "usage": "Usage"}
        }"#,
    )
    .unwrap();

    cuelog()
        .arg("export")
        .arg(&request)
        .args(["-f", "csv", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Export Complete"));

    let csv = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Series Title,Night Shift");
    assert_eq!(lines[1], "SEQ#,TCR In,Title,Usage");
    assert_eq!(lines[2], "1,00:01:01:00,Chase,\"BV,SRC\"");
}

#[test]
fn test_export_excel_default_output() {
    let dir = TempDir::new().unwrap();
    let request = dir.path().join("request.json");
    fs::write(
        &request,
        r#"{"markers": [{"title": "Intro"}], "originalFileName": "ep01.xlsx"}"#,
    )
    .unwrap();

    cuelog().arg("export").arg(&request).assert().success();

    let bytes = fs::read(dir.path().join("ep01.xlsx")).unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn test_export_invalid_request_fails() {
    let dir = TempDir::new().unwrap();
    let request = dir.path().join("request.json");
    fs::write(&request, "{ not json").unwrap();

    cuelog().arg("export").arg(&request).assert().failure();
}

// ═══════════════════════════════════════════════════════════════════════════
// CUELOG-SERVER BINARY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_server_binary_help() {
    let mut cmd = Command::cargo_bin("cuelog-server").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cuelog API Server"));
}

#[test]
fn test_server_binary_version() {
    let mut cmd = Command::cargo_bin("cuelog-server").unwrap();
    cmd.arg("--version").assert().success();
}

// Server startup binds a port; the router itself is covered by api_tests.rs
