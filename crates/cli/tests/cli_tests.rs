//! CLI integration tests

use std::process::Command;
use tempfile::TempDir;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "container-discovery", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Container discovery"), "Should show description");
    assert!(stdout.contains("--address"), "Should show address option");
    assert!(stdout.contains("--collectMethod"), "Should show collect method option");
    assert!(stdout.contains("--sslCertVerify"), "Should show SSL option");
    assert!(stdout.contains("--intervalSize"), "Should show interval size option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "container-discovery", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("discover"), "Should show binary name");
}

/// Test that an invalid mode is rejected by argument parsing
#[test]
fn test_invalid_mode_rejected() {
    let output = Command::new("cargo")
        .args(["run", "-p", "container-discovery", "--", "--mode", "sometimes"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Invalid mode should fail");
    assert!(stderr.contains("current|all"), "Should list accepted modes");
}

/// Test that an unreachable server aborts the run with a non-zero exit
#[test]
fn test_unreachable_server_fails_and_writes_audit_log() {
    let dir = TempDir::new().unwrap();
    let output_dir = dir.path().join("data");

    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "container-discovery",
            "--",
            "--address",
            "127.0.0.1",
            "--port",
            "1",
            "--timeout",
            "5",
            "--quiet",
            "--output-dir",
        ])
        .arg(&output_dir)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Run against a closed port should fail");

    let log = std::fs::read_to_string(output_dir.join("log.txt")).expect("audit log written");
    assert!(log.starts_with("Version "), "Should record the version first");
    assert!(log.contains("/api/v1/query?query="), "Should record the failed URL");
    assert!(!output_dir.join("config.csv").exists(), "No exports after a failed seed");
}
