//! CLI integration tests

use std::process::Command;

fn servectl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_servectl"));
    cmd.env_remove("SERVECTL_URL");
    cmd
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = servectl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("model inference server"), "Should show about text");
    for command in ["status", "info", "predict", "batch", "metrics", "bench"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
    assert!(stdout.contains("SERVECTL_URL"), "Should show env fallback");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = servectl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("servectl"), "Should show binary name");
}

/// Test batch subcommand help
#[test]
fn test_batch_help() {
    let output = servectl()
        .args(["batch", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Batch help should succeed");
    assert!(stdout.contains("--input"), "Should show input option");
    assert!(stdout.contains("--file"), "Should show file option");
}

/// Test bench subcommand help
#[test]
fn test_bench_help() {
    let output = servectl()
        .args(["bench", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Bench help should succeed");
    assert!(stdout.contains("--requests"), "Should show requests option");
    assert!(stdout.contains("--concurrency"), "Should show concurrency option");
}

/// Test that predict requires feature values
#[test]
fn test_predict_requires_features() {
    let output = servectl()
        .arg("predict")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Predict without features should fail");
}

/// Test that non-numeric features are rejected before any request
#[test]
fn test_predict_rejects_non_numeric_features() {
    let output = servectl()
        .args(["predict", "5.1", "wide", "1.4", "0.2"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("wide"), "Should name the bad value");
}

/// Test that an unreachable server is reported with a non-zero exit
#[test]
fn test_unreachable_server_fails() {
    let output = servectl()
        .args(["--url", "http://127.0.0.1:9", "info"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to send request"));
}

/// Test that an invalid URL is rejected
#[test]
fn test_invalid_url_fails() {
    let output = servectl()
        .args(["--url", "not a url", "status"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Invalid API URL"));
}
