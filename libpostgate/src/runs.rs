//! Durable run facility
//!
//! [`RunFacility`] is the hand-off point between scheduling and dispatch.
//! [`LocalRunQueue`] keeps runs in the SQLite `runs` table, where the
//! `postgate-send` dispatcher picks them up once they are due.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::types::{PostJob, RunFlags, RunRecord, RunStatus};

/// Workflow name for post uploads
pub const UPLOAD_WORKFLOW: &str = "upload_post";

/// Identifiers of a created run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: String,
    pub thread_id: String,
}

#[async_trait]
pub trait RunFacility: Send + Sync {
    /// Create a run that starts after `delay_seconds` (immediately if `None`)
    async fn create_run(
        &self,
        workflow: &str,
        job: &PostJob,
        flags: RunFlags,
        delay_seconds: Option<u64>,
    ) -> Result<RunHandle>;
}

pub struct LocalRunQueue {
    db: Database,
}

impl LocalRunQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RunFacility for LocalRunQueue {
    async fn create_run(
        &self,
        workflow: &str,
        job: &PostJob,
        flags: RunFlags,
        delay_seconds: Option<u64>,
    ) -> Result<RunHandle> {
        let now = chrono::Utc::now().timestamp();
        let delay = i64::try_from(delay_seconds.unwrap_or(0)).unwrap_or(i64::MAX);

        let record = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            thread_id: Uuid::new_v4().to_string(),
            workflow: workflow.to_string(),
            job: job.clone(),
            flags,
            status: RunStatus::Scheduled,
            scheduled_for: now.saturating_add(delay),
            created_at: now,
            error: None,
        };

        self.db.insert_run(&record).await?;
        debug!(
            "Created {} run {} due at {}",
            workflow, record.run_id, record.scheduled_for
        );

        Ok(RunHandle {
            run_id: record.run_id,
            thread_id: record.thread_id,
        })
    }
}
