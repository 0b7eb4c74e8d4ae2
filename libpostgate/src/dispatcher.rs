//! Dispatching due runs to the uploader
//!
//! The `upload_attempts` ledger makes dispatch safe to repeat: a provider
//! that already succeeded for a run is never posted to again, and a failure
//! that was already reported is not reported again.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::{DbError, Result};
use crate::runs::UPLOAD_WORKFLOW;
use crate::types::{Provider, RunStatus, UploadAttempt, UploadReport, UploadResult};
use crate::uploader::{Attempt, Uploader};

/// Runs taken from the queue per poll
pub const DISPATCH_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub posted: usize,
    pub partial: usize,
    pub failed: usize,
    /// Runs another dispatcher claimed first
    pub skipped: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.posted + self.partial + self.failed
    }

    fn count(&mut self, status: Option<RunStatus>) {
        match status {
            Some(RunStatus::Posted) => self.posted += 1,
            Some(RunStatus::Partial) => self.partial += 1,
            Some(_) => self.failed += 1,
            None => self.skipped += 1,
        }
    }
}

pub struct Dispatcher {
    db: Database,
    uploader: Arc<Uploader>,
}

impl Dispatcher {
    pub fn new(db: Database, uploader: Arc<Uploader>) -> Self {
        Self { db, uploader }
    }

    /// Dispatch every run due at `now`
    pub async fn dispatch_due(&self, now: i64) -> Result<DispatchSummary> {
        let due = self.db.due_runs(now, DISPATCH_BATCH_SIZE).await?;
        if due.is_empty() {
            debug!("No runs due");
            return Ok(DispatchSummary::default());
        }

        info!("Found {} due run(s)", due.len());
        let mut summary = DispatchSummary::default();
        for run in due {
            match self.dispatch_run(&run.run_id, now).await {
                Ok(status) => summary.count(status),
                Err(e) => {
                    error!("Run {} could not be dispatched: {}", run.run_id, e);
                    summary.count(Some(RunStatus::Failed));
                }
            }
        }
        Ok(summary)
    }

    /// Claim and execute one run
    ///
    /// Returns the final status, or `None` if the run was not claimable
    /// (already running, finished, or missing). An error after the claim
    /// marks the run failed, so `retry` can pick it up again.
    pub async fn dispatch_run(&self, run_id: &str, now: i64) -> Result<Option<RunStatus>> {
        if !self.db.claim_run(run_id, now).await? {
            debug!("Run {} was not claimable", run_id);
            return Ok(None);
        }

        match self.execute_claimed(run_id, now).await {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                let message = format!("Dispatch error: {}", e);
                if let Err(finish_error) = self
                    .db
                    .finish_run(run_id, RunStatus::Failed, Some(&message), now)
                    .await
                {
                    error!(
                        "Run {} is stuck in running, could not mark it failed: {}",
                        run_id, finish_error
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute_claimed(&self, run_id: &str, now: i64) -> Result<RunStatus> {
        let run = self
            .db
            .get_run(run_id)
            .await?
            .ok_or_else(|| DbError::Corrupt(format!("claimed run {} disappeared", run_id)))?;

        if run.workflow != UPLOAD_WORKFLOW {
            let message = format!("Unknown workflow '{}'", run.workflow);
            warn!("Run {}: {}", run_id, message);
            self.db
                .finish_run(run_id, RunStatus::Failed, Some(&message), now)
                .await?;
            return Ok(RunStatus::Failed);
        }

        let ledger: HashMap<Provider, UploadAttempt> = self
            .db
            .upload_attempts(run_id)
            .await?
            .into_iter()
            .map(|a| (a.provider, a))
            .collect();

        let mut results: HashMap<Provider, UploadResult> = HashMap::new();
        let mut attempts = Vec::new();
        for provider in Provider::ALL {
            match ledger.get(&provider) {
                Some(previous) if previous.succeeded => {
                    info!("Run {}: {} already posted, skipping", run_id, provider);
                    results.insert(provider, UploadResult::success(provider));
                }
                Some(previous) => attempts.push(
                    Attempt {
                        notify_on_failure: !previous.notified,
                        ..Attempt::new(provider)
                    }
                    .with_thread_root(previous.thread_root_id.clone()),
                ),
                None => attempts.push(Attempt::new(provider)),
            }
        }

        let outcomes = self
            .uploader
            .upload_providers(&run.job, run.flags, &run.thread_id, &attempts)
            .await;

        let attempted_at = chrono::Utc::now().timestamp();
        for outcome in outcomes {
            let provider = outcome.result.provider;
            self.db
                .record_upload_attempt(&UploadAttempt {
                    run_id: run_id.to_string(),
                    provider,
                    succeeded: outcome.result.succeeded,
                    error: outcome.result.error.clone(),
                    notified: outcome.notified,
                    attempted_at,
                    thread_root_id: outcome.thread_root_id.clone(),
                })
                .await?;
            results.insert(provider, outcome.result);
        }

        let report = UploadReport {
            twitter: take_result(&mut results, Provider::Twitter),
            linkedin: take_result(&mut results, Provider::LinkedIn),
        };
        let status = RunStatus::from_report(&report);
        let error = failure_summary(&report);

        self.db
            .finish_run(run_id, status, error.as_deref(), attempted_at)
            .await?;
        info!("Run {} finished as {}", run_id, status);

        Ok(status)
    }
}

fn take_result(results: &mut HashMap<Provider, UploadResult>, provider: Provider) -> UploadResult {
    results
        .remove(&provider)
        .unwrap_or_else(|| UploadResult::failure(provider, "upload was not attempted"))
}

/// `"Twitter: ..; LinkedIn: .."` for the failed providers
fn failure_summary(report: &UploadReport) -> Option<String> {
    let failures: Vec<String> = Provider::ALL
        .iter()
        .map(|p| report.get(*p))
        .filter(|r| !r.succeeded)
        .map(|r| format!("{}: {}", r.provider, r.error.as_deref().unwrap_or("unknown error")))
        .collect();

    if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    }
}
