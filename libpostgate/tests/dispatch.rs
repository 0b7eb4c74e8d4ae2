//! Dispatching queued runs to mock platforms

use std::sync::Arc;

use libpostgate::config::DEFAULT_SIGNATURE;
use libpostgate::dispatcher::{DispatchSummary, Dispatcher};
use libpostgate::notify::Notifier;
use libpostgate::platforms::mock::{MockChannel, MockLinkedIn, MockMedia, MockTwitter};
use libpostgate::runs::{LocalRunQueue, RunFacility, UPLOAD_WORKFLOW};
use libpostgate::types::{PostJob, Provider, RunFlags, RunRecord, RunStatus};
use libpostgate::uploader::Uploader;
use libpostgate::Database;
use tempfile::TempDir;

async fn open_db(temp_dir: &TempDir) -> Database {
    let db_path = temp_dir.path().join("postgate.db");
    Database::new(db_path.to_str().unwrap()).await.unwrap()
}

fn dispatcher(
    db: &Database,
    twitter: &MockTwitter,
    linkedin: &MockLinkedIn,
    channel: &MockChannel,
) -> Dispatcher {
    let uploader = Uploader::new(
        Arc::new(twitter.clone()),
        Arc::new(linkedin.clone()),
        Arc::new(MockMedia::png()),
        Notifier::to_channel(Arc::new(channel.clone()), "C-ops"),
        DEFAULT_SIGNATURE,
    );
    Dispatcher::new(db.clone(), Arc::new(uploader))
}

async fn queue(db: &Database, job: PostJob) -> String {
    LocalRunQueue::new(db.clone())
        .create_run(UPLOAD_WORKFLOW, &job, RunFlags::default(), None)
        .await
        .unwrap()
        .run_id
}

fn soon() -> i64 {
    chrono::Utc::now().timestamp() + 1
}

#[tokio::test]
async fn test_due_run_posted_to_both() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) =
        (MockTwitter::success(), MockLinkedIn::success(), MockChannel::new());
    let run_id = queue(&db, PostJob::new("Hello")).await;

    let summary = dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    assert_eq!(summary.posted, 1);
    assert_eq!(summary.total(), 1);
    assert_eq!(twitter.call_count(), 1);
    assert_eq!(linkedin.call_count(), 1);
    assert!(channel.messages().is_empty());

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Posted);
    assert_eq!(run.error, None);

    let attempts = db.upload_attempts(&run_id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.succeeded));
}

#[tokio::test]
async fn test_partial_failure_reports_only_failed_provider() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) = (
        MockTwitter::rate_limited("Too Many Requests"),
        MockLinkedIn::success(),
        MockChannel::new(),
    );
    let run_id = queue(&db, PostJob::new("Hello")).await;

    let summary = dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    assert_eq!(summary.partial, 1);
    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.error.as_deref(), Some("Twitter: Too Many Requests"));

    let messages = channel.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "C-ops");
    assert!(messages[0].1.contains("FAILED TO UPLOAD POST TO TWITTER"));
    assert!(messages[0].1.contains("Too Many Requests"));
}

#[tokio::test]
async fn test_both_failing_reports_each_provider() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) = (
        MockTwitter::failure("duplicate content"),
        MockLinkedIn::failure("token expired"),
        MockChannel::new(),
    );
    let run_id = queue(&db, PostJob::new("Hello")).await;

    dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.error.as_deref(),
        Some("Twitter: duplicate content; LinkedIn: token expired")
    );

    let messages = channel.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().any(|(_, text)| text.contains("TO TWITTER")));
    assert!(messages.iter().any(|(_, text)| text.contains("TO LINKEDIN")));
}

#[tokio::test]
async fn test_retry_skips_posted_provider_and_does_not_renotify() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let linkedin = MockLinkedIn::success();
    let channel = MockChannel::new();
    let run_id = queue(&db, PostJob::new("Hello")).await;

    let failing_twitter = MockTwitter::failure("service unavailable");
    dispatcher(&db, &failing_twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();
    assert_eq!(channel.messages().len(), 1);

    // Still failing: no second LinkedIn post and no second failure report
    assert!(db.requeue_run(&run_id, soon()).await.unwrap());
    let status = dispatcher(&db, &failing_twitter, &linkedin, &channel)
        .dispatch_run(&run_id, soon())
        .await
        .unwrap();
    assert_eq!(status, Some(RunStatus::Partial));
    assert_eq!(failing_twitter.call_count(), 2);
    assert_eq!(linkedin.call_count(), 1);
    assert_eq!(channel.messages().len(), 1);

    let twitter_attempt = db
        .upload_attempts(&run_id)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.provider == Provider::Twitter)
        .unwrap();
    assert!(twitter_attempt.notified);

    // Twitter recovers
    assert!(db.requeue_run(&run_id, soon()).await.unwrap());
    let twitter = MockTwitter::success();
    let status = dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_run(&run_id, soon())
        .await
        .unwrap();
    assert_eq!(status, Some(RunStatus::Posted));
    assert_eq!(twitter.call_count(), 1);
    assert_eq!(linkedin.call_count(), 1);
}

#[tokio::test]
async fn test_finished_run_is_not_claimed_again() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) =
        (MockTwitter::success(), MockLinkedIn::success(), MockChannel::new());
    let run_id = queue(&db, PostJob::new("Hello")).await;
    let dispatcher = dispatcher(&db, &twitter, &linkedin, &channel);

    dispatcher.dispatch_run(&run_id, soon()).await.unwrap();
    let second = dispatcher.dispatch_run(&run_id, soon()).await.unwrap();

    assert_eq!(second, None);
    assert_eq!(twitter.call_count(), 1);
    assert!(!db.requeue_run(&run_id, soon()).await.unwrap());
}

#[tokio::test]
async fn test_future_run_waits() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) =
        (MockTwitter::success(), MockLinkedIn::success(), MockChannel::new());

    LocalRunQueue::new(db.clone())
        .create_run(UPLOAD_WORKFLOW, &PostJob::new("Later"), RunFlags::default(), Some(3_600))
        .await
        .unwrap();

    let summary = dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    assert_eq!(summary, DispatchSummary::default());
    assert_eq!(twitter.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_workflow_fails_run() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) =
        (MockTwitter::success(), MockLinkedIn::success(), MockChannel::new());
    let now = chrono::Utc::now().timestamp();

    db.insert_run(&RunRecord {
        run_id: "run-legacy".to_string(),
        thread_id: "thread-legacy".to_string(),
        workflow: "delete_post".to_string(),
        job: PostJob::new("Hello"),
        flags: RunFlags::default(),
        status: RunStatus::Scheduled,
        scheduled_for: now,
        created_at: now,
        error: None,
    })
    .await
    .unwrap();

    let summary = dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(twitter.call_count(), 0);
    let run = db.get_run("run-legacy").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("delete_post"));
}

#[tokio::test]
async fn test_thread_posts_signature_on_main_only() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) =
        (MockTwitter::success(), MockLinkedIn::success(), MockChannel::new());
    queue(
        &db,
        PostJob::new("").with_complex_post("Big news", "Details in the reply"),
    )
    .await;

    dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    let thread = &twitter.calls()[0];
    assert_eq!(thread.len(), 2);
    assert!(thread[0].text.ends_with(DEFAULT_SIGNATURE));
    assert_eq!(thread[1].text, "Details in the reply");

    let share = &linkedin.calls()[0];
    assert!(share.text.starts_with("Big news\n\nDetails in the reply"));
}

#[tokio::test]
async fn test_broken_thread_retry_posts_reply_only() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) = (
        MockTwitter::fail_after(1, "reply rejected"),
        MockLinkedIn::success(),
        MockChannel::new(),
    );
    let run_id = queue(&db, PostJob::new("").with_complex_post("Main", "Reply")).await;
    let dispatcher = dispatcher(&db, &twitter, &linkedin, &channel);

    let status = dispatcher.dispatch_run(&run_id, soon()).await.unwrap();
    assert_eq!(status, Some(RunStatus::Partial));

    let twitter_attempt = db
        .upload_attempts(&run_id)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.provider == Provider::Twitter)
        .unwrap();
    assert!(!twitter_attempt.succeeded);
    assert_eq!(twitter_attempt.thread_root_id.as_deref(), Some("mock-tweet-1-0"));

    assert!(db.requeue_run(&run_id, soon()).await.unwrap());
    let status = dispatcher.dispatch_run(&run_id, soon()).await.unwrap();
    assert_eq!(status, Some(RunStatus::Posted));

    let published = twitter.published();
    let mains = published.iter().filter(|t| t.text.starts_with("Main")).count();
    assert_eq!(mains, 1);
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].text, "Reply");
    assert_eq!(published[1].in_reply_to.as_deref(), Some("mock-tweet-1-0"));
    assert_eq!(linkedin.call_count(), 1);
}

#[tokio::test]
async fn test_database_error_after_claim_fails_run() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_db(&temp_dir).await;
    let (twitter, linkedin, channel) =
        (MockTwitter::success(), MockLinkedIn::success(), MockChannel::new());
    let first = queue(&db, PostJob::new("First")).await;
    let second = queue(&db, PostJob::new("Second")).await;

    // Break the ledger behind the dispatcher's back
    let db_path = temp_dir.path().join("postgate.db");
    let pool = sqlx::sqlite::SqlitePool::connect(&format!("sqlite://{}", db_path.display()))
        .await
        .unwrap();
    sqlx::query("DROP TABLE upload_attempts")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let summary = dispatcher(&db, &twitter, &linkedin, &channel)
        .dispatch_due(soon())
        .await
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(twitter.call_count(), 0);
    for run_id in [&first, &second] {
        let run = db.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().starts_with("Dispatch error"));
        assert!(db.requeue_run(run_id, soon()).await.unwrap());
    }
}
