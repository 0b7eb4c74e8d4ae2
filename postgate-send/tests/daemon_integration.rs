//! Integration tests for the postgate-send daemon
//!
//! The configs carry no platform credentials, so every upload fails before
//! any request is made.

use assert_cmd::Command;
use libpostgate::types::{RunFlags, RunRecord};
use libpostgate::{Database, PostJob, Provider, RunStatus};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

async fn setup_test_env() -> (TempDir, String, Database) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("postgate.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[dispatch]
poll_interval = 1
"#,
        db_path.display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();

    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    (temp_dir, config_path.to_str().unwrap().to_string(), db)
}

async fn create_run(db: &Database, scheduled_for: i64) -> String {
    let run_id = uuid::Uuid::new_v4().to_string();
    db.insert_run(&RunRecord {
        run_id: run_id.clone(),
        thread_id: uuid::Uuid::new_v4().to_string(),
        workflow: "upload_post".to_string(),
        job: PostJob::new("Test scheduled post"),
        flags: RunFlags::default(),
        status: RunStatus::Scheduled,
        scheduled_for,
        created_at: chrono::Utc::now().timestamp(),
        error: None,
    })
    .await
    .unwrap();
    run_id
}

fn send(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("postgate-send").unwrap();
    cmd.env("POSTGATE_CONFIG", config_path)
        .env_remove("RUST_LOG")
        .env_remove("POSTGATE_LOG_LEVEL");
    cmd
}

#[tokio::test]
async fn test_once_with_empty_queue() {
    let (_temp_dir, config_path, _db) = setup_test_env().await;

    send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("postgate-send daemon starting"))
        .stderr(predicate::str::contains("processed due runs once"));
}

#[tokio::test]
async fn test_once_fails_run_without_credentials() {
    let (_temp_dir, config_path, db) = setup_test_env().await;
    let now = chrono::Utc::now().timestamp();
    let run_id = create_run(&db, now - 10).await;

    send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("1 failed"));

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    let error = run.error.unwrap();
    assert!(error.contains("Twitter:"));
    assert!(error.contains("LinkedIn:"));

    let attempts = db.upload_attempts(&run_id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| !a.succeeded && !a.notified));
    assert!(attempts.iter().any(|a| a.provider == Provider::LinkedIn));
}

#[tokio::test]
async fn test_once_leaves_future_runs_queued() {
    let (_temp_dir, config_path, db) = setup_test_env().await;
    let run_id = create_run(&db, chrono::Utc::now().timestamp() + 3_600).await;

    send(&config_path).arg("--once").assert().success();

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Scheduled);
}

#[tokio::test]
async fn test_zero_poll_interval_rejected() {
    let (_temp_dir, config_path, _db) = setup_test_env().await;

    send(&config_path)
        .args(["--once", "--poll-interval", "0"])
        .assert()
        .code(3);
}

#[test]
fn test_missing_config_exits_with_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.toml");

    send(missing.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2);
}
