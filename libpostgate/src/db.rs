//! Database operations for Postgate

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{
    HumanResponse, PendingInterrupt, PostJob, Provider, RunFlags, RunRecord, RunStatus,
    UploadAttempt,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    pub async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let input = serde_json::to_string(&run.job).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO runs (run_id, thread_id, workflow, input, post_to_organization, text_only,
                              status, scheduled_for, created_at, updated_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.thread_id)
        .bind(&run.workflow)
        .bind(input)
        .bind(run.flags.post_to_organization)
        .bind(run.flags.text_only)
        .bind(run.status.as_str())
        .bind(run.scheduled_for)
        .bind(run.created_at)
        .bind(run.created_at)
        .bind(&run.error)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, thread_id, workflow, input, post_to_organization, text_only,
                   status, scheduled_for, created_at, error
            FROM runs WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(run_from_row).transpose()
    }

    /// Most recent runs first, optionally filtered by status
    pub async fn list_runs(&self, status: Option<RunStatus>, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, thread_id, workflow, input, post_to_organization, text_only,
                   status, scheduled_for, created_at, error
            FROM runs
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC, run_id
            LIMIT ?
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(run_from_row).collect()
    }

    /// Scheduled runs whose time has come, oldest first
    pub async fn due_runs(&self, now: i64, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, thread_id, workflow, input, post_to_organization, text_only,
                   status, scheduled_for, created_at, error
            FROM runs
            WHERE status = 'scheduled' AND scheduled_for <= ?
            ORDER BY scheduled_for ASC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(run_from_row).collect()
    }

    /// Move a run from `scheduled` to `running`
    ///
    /// Returns `false` when another dispatcher got there first or the run is
    /// not scheduled.
    pub async fn claim_run(&self, run_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = 'running', updated_at = ?
            WHERE run_id = ? AND status = 'scheduled'
            "#,
        )
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE runs SET status = ?, error = ?, updated_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Put a partial or failed run back in the queue
    ///
    /// Returns `false` if the run is in any other state.
    pub async fn requeue_run(&self, run_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = 'scheduled', scheduled_for = ?, error = NULL, updated_at = ?
            WHERE run_id = ? AND status IN ('partial', 'failed')
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------
    // Pending interrupts
    // ------------------------------------------------------------------

    pub async fn insert_pending_interrupt(&self, pending: &PendingInterrupt) -> Result<()> {
        let event = serde_json::to_string(&pending.event).map_err(DbError::Serialization)?;
        let job = serde_json::to_string(&pending.job).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO pending_interrupts (run_id, event, job, post_to_organization, text_only,
                                            created_at, resolved_at, response)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&pending.run_id)
        .bind(event)
        .bind(job)
        .bind(pending.flags.post_to_organization)
        .bind(pending.flags.text_only)
        .bind(pending.created_at)
        .bind(pending.resolved_at)
        .bind(pending.response.map(|r| r.as_str()))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_pending_interrupt(&self, run_id: &str) -> Result<Option<PendingInterrupt>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, event, job, post_to_organization, text_only, created_at, resolved_at, response
            FROM pending_interrupts WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(interrupt_from_row).transpose()
    }

    /// Unresolved interrupts, oldest first
    pub async fn pending_interrupts(&self) -> Result<Vec<PendingInterrupt>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, event, job, post_to_organization, text_only, created_at, resolved_at, response
            FROM pending_interrupts
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC, run_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(interrupt_from_row).collect()
    }

    /// Record the operator's response
    ///
    /// Only an unresolved interrupt can be resolved; returns `false` if the
    /// run does not exist or was already resolved.
    pub async fn resolve_interrupt(
        &self,
        run_id: &str,
        response: HumanResponse,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pending_interrupts SET resolved_at = ?, response = ?
            WHERE run_id = ? AND resolved_at IS NULL
            "#,
        )
        .bind(now)
        .bind(response.as_str())
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------
    // Upload ledger
    // ------------------------------------------------------------------

    /// Insert or replace the attempt for `(run_id, provider)`
    ///
    /// The `notified` flag is sticky: once a failure was notified it stays
    /// notified. A recorded thread root is never cleared.
    pub async fn record_upload_attempt(&self, attempt: &UploadAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_attempts (run_id, provider, succeeded, error, notified, attempted_at,
                                         thread_root_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id, provider) DO UPDATE SET
                succeeded = excluded.succeeded,
                error = excluded.error,
                notified = MAX(upload_attempts.notified, excluded.notified),
                attempted_at = excluded.attempted_at,
                thread_root_id = COALESCE(excluded.thread_root_id, upload_attempts.thread_root_id)
            "#,
        )
        .bind(&attempt.run_id)
        .bind(attempt.provider.as_str())
        .bind(attempt.succeeded)
        .bind(&attempt.error)
        .bind(attempt.notified)
        .bind(attempt.attempted_at)
        .bind(&attempt.thread_root_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn upload_attempts(&self, run_id: &str) -> Result<Vec<UploadAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, provider, succeeded, error, notified, attempted_at, thread_root_id
            FROM upload_attempts
            WHERE run_id = ?
            ORDER BY provider
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| -> Result<UploadAttempt> {
                let provider: String = r.get("provider");
                Ok(UploadAttempt {
                    run_id: r.get("run_id"),
                    provider: provider
                        .parse::<Provider>()
                        .map_err(|e| DbError::Corrupt(e.to_string()))?,
                    succeeded: r.get::<i64, _>("succeeded") != 0,
                    error: r.get("error"),
                    notified: r.get::<i64, _>("notified") != 0,
                    attempted_at: r.get("attempted_at"),
                    thread_root_id: r.get("thread_root_id"),
                })
            })
            .collect()
    }
}

fn flags_from_row(row: &SqliteRow) -> RunFlags {
    RunFlags {
        post_to_organization: row.get::<i64, _>("post_to_organization") != 0,
        text_only: row.get::<i64, _>("text_only") != 0,
    }
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let input: String = row.get("input");
    let job: PostJob = serde_json::from_str(&input).map_err(DbError::Serialization)?;
    let status: String = row.get("status");

    Ok(RunRecord {
        run_id: row.get("run_id"),
        thread_id: row.get("thread_id"),
        workflow: row.get("workflow"),
        job,
        flags: flags_from_row(row),
        status: status
            .parse::<RunStatus>()
            .map_err(|e| DbError::Corrupt(e.to_string()))?,
        scheduled_for: row.get("scheduled_for"),
        created_at: row.get("created_at"),
        error: row.get("error"),
    })
}

fn interrupt_from_row(row: &SqliteRow) -> Result<PendingInterrupt> {
    let event: String = row.get("event");
    let job: String = row.get("job");
    let response: Option<String> = row.get("response");

    Ok(PendingInterrupt {
        run_id: row.get("run_id"),
        event: serde_json::from_str(&event).map_err(DbError::Serialization)?,
        job: serde_json::from_str(&job).map_err(DbError::Serialization)?,
        flags: flags_from_row(row),
        created_at: row.get("created_at"),
        resolved_at: row.get("resolved_at"),
        response: response
            .map(|r| r.parse::<HumanResponse>())
            .transpose()
            .map_err(|e| DbError::Corrupt(e.to_string()))?,
    })
}
