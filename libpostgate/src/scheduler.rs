//! Handing approved posts to the run facility

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::notify::{schedule_message, Notifier};
use crate::runs::{RunFacility, RunHandle, UPLOAD_WORKFLOW};
use crate::scheduling::compute_delay;
use crate::types::{PostJob, RunFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "timestamp")]
pub enum ScheduledFor {
    Immediate,
    At(i64),
}

impl fmt::Display for ScheduledFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledFor::Immediate => f.write_str("immediate"),
            ScheduledFor::At(ts) => match chrono::DateTime::from_timestamp(*ts, 0) {
                Some(dt) => write!(f, "{}", dt.to_rfc3339()),
                None => write!(f, "{}", ts),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPost {
    pub handle: RunHandle,
    pub scheduled_for: ScheduledFor,
    pub delay_seconds: Option<u64>,
}

pub struct PostScheduler {
    runs: Arc<dyn RunFacility>,
    notifier: Notifier,
}

impl PostScheduler {
    pub fn new(runs: Arc<dyn RunFacility>, notifier: Notifier) -> Self {
        Self { runs, notifier }
    }

    pub async fn schedule(&self, job: &PostJob, flags: RunFlags) -> Result<ScheduledPost> {
        self.schedule_at(job, flags, chrono::Utc::now().timestamp())
            .await
    }

    /// Schedule relative to an explicit clock
    ///
    /// Failing to create the run is an error; failing to announce it is only
    /// logged.
    pub async fn schedule_at(&self, job: &PostJob, flags: RunFlags, now: i64) -> Result<ScheduledPost> {
        let delay_seconds = compute_delay(job.schedule_at, now);
        let handle = self
            .runs
            .create_run(UPLOAD_WORKFLOW, job, flags, delay_seconds)
            .await?;

        // A time already passed runs now, and is reported that way
        let effective_at = job.schedule_at.filter(|_| delay_seconds.unwrap_or(0) > 0);
        let scheduled_for = match effective_at {
            Some(at) => ScheduledFor::At(at),
            None => ScheduledFor::Immediate,
        };

        info!(
            "Scheduled run {} for {} (thread {})",
            handle.run_id, scheduled_for, handle.thread_id
        );

        self.notifier
            .send(&schedule_message(
                effective_at,
                &handle.run_id,
                &handle.thread_id,
                job,
                flags.text_only,
            ))
            .await;

        Ok(ScheduledPost {
            handle,
            scheduled_for,
            delay_seconds,
        })
    }
}
