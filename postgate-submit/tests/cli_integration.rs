//! Command-line tests for postgate-submit
//!
//! Configs live in a temp dir and point at a temp database. Slack is never
//! configured, so no test touches the network.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Complete direct credentials; the live Twitter check stays off so the
/// tests never reach the network
const FULL_CREDENTIALS: &str = r#"
[auth]
verify_credentials = false

[twitter]
api_key = "key"
api_key_secret = "secret"
access_token = "token"
access_token_secret = "token-secret"

[linkedin]
access_token = "li-token"
person_urn = "urn:li:person:abc"
"#;

fn write_config(temp_dir: &TempDir, extra: &str) -> String {
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("postgate.db");
    let content = format!(
        "[database]\npath = \"{}\"\n{}",
        db_path.display().to_string().replace('\\', "/"),
        extra
    );
    fs::write(&config_path, content).unwrap();
    config_path.to_str().unwrap().to_string()
}

fn submit(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("postgate-submit").unwrap();
    cmd.env("POSTGATE_CONFIG", config_path)
        .env_remove("RUST_LOG")
        .env_remove("POSTGATE_LOG_FORMAT");
    cmd
}

#[test]
fn test_help_lists_schedule_formats() {
    Command::cargo_bin("postgate-submit")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SCHEDULE FORMATS"))
        .stdout(predicate::str::contains("random:10m-20m"));
}

#[test]
fn test_empty_text_is_invalid_input() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, "");

    submit(&config_path)
        .arg("   ")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No post text found"));
}

#[test]
fn test_bad_schedule_is_invalid_input() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, FULL_CREDENTIALS);

    submit(&config_path)
        .args(["Hello", "--schedule", "whenever you like"])
        .assert()
        .code(3);
}

#[test]
fn test_bad_format_is_invalid_input() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, FULL_CREDENTIALS);

    submit(&config_path)
        .args(["Hello", "--format", "yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_missing_config_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    submit(missing.to_str().unwrap())
        .arg("Hello")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_missing_credentials_pause_for_authorization() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, "");

    submit(&config_path)
        .arg("Hello")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("awaiting_authorization:"))
        .stderr(predicate::str::contains("# Authorization Required"))
        .stderr(predicate::str::contains("Twitter Authorization Docs:"))
        .stderr(predicate::str::contains("LinkedIn Authorization Docs:"));
}

#[test]
fn test_missing_credentials_json_carries_interrupt() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, "");

    let output = submit(&config_path)
        .args(["Hello", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "awaiting_authorization");
    assert!(json["run_id"].as_str().is_some());
    assert_eq!(json["interrupt"]["action"], "Authorize Social Media Accounts");
    assert!(json["interrupt"]["args"]["twitterAuthorizationDocs"].is_string());
    assert!(json["interrupt"]["args"]["authorizationDocs"].is_string());
    assert_eq!(json["interrupt"]["config"]["allow_edit"], false);
}

#[test]
fn test_configured_accounts_schedule_run() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, FULL_CREDENTIALS);

    submit(&config_path)
        .arg("Hello world")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("scheduled:"))
        .stdout(predicate::str::contains(":immediate"));
}

#[test]
fn test_main_without_reply_is_usage_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, FULL_CREDENTIALS);

    submit(&config_path)
        .args(["--main", "Big news"])
        .assert()
        .code(2);
}

#[test]
fn test_stdin_text_with_delay_json() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, FULL_CREDENTIALS);

    let output = submit(&config_path)
        .args(["--schedule", "2h", "--format", "json"])
        .write_stdin("From a pipe\n")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "scheduled");
    assert_eq!(json["scheduled_for"]["kind"], "at");
    let delay = json["delay_seconds"].as_u64().unwrap();
    assert!(delay > 7_100 && delay <= 7_200);
}
