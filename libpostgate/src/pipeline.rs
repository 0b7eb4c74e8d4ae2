//! The gated posting workflow
//!
//! [`Pipeline::submit`] runs the authorization gate. When every provider is
//! usable the post is scheduled right away; otherwise the combined interrupt
//! is persisted under a fresh run id and the run stops there. The operator
//! later calls [`Pipeline::resume`] with `accept` or `ignore`, possibly from
//! a different process.

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthGate;
use crate::db::Database;
use crate::error::{AuthError, PostgateError, Result};
use crate::interrupt::InterruptAggregator;
use crate::scheduler::{PostScheduler, ScheduledPost};
use crate::types::{HumanResponse, InterruptEvent, PendingInterrupt, PostJob, RunFlags};

/// What `accept` means for credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Continue without checking credentials again
    #[default]
    TrustOnResume,
    /// Re-run the gate and refuse to continue while anything is missing
    Revalidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Scheduled(ScheduledPost),
    AwaitingAuthorization {
        run_id: String,
        event: InterruptEvent,
    },
}

pub struct Pipeline {
    gate: AuthGate,
    scheduler: PostScheduler,
    db: Database,
    flags: RunFlags,
    policy: ResumePolicy,
}

impl Pipeline {
    pub fn new(gate: AuthGate, scheduler: PostScheduler, db: Database, flags: RunFlags) -> Self {
        Self {
            gate,
            scheduler,
            db,
            flags,
            policy: ResumePolicy::default(),
        }
    }

    pub fn with_resume_policy(mut self, policy: ResumePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resume_policy(&self) -> ResumePolicy {
        self.policy
    }

    pub async fn submit(&self, job: PostJob) -> Result<SubmitOutcome> {
        job.validate()?;

        let requests = self.gate.check_all().await?;
        let Some(event) = InterruptAggregator::combine(requests)? else {
            let scheduled = self.scheduler.schedule(&job, self.flags).await?;
            return Ok(SubmitOutcome::Scheduled(scheduled));
        };

        let run_id = Uuid::new_v4().to_string();
        self.db
            .insert_pending_interrupt(&PendingInterrupt {
                run_id: run_id.clone(),
                event: event.clone(),
                job,
                flags: self.flags,
                created_at: chrono::Utc::now().timestamp(),
                resolved_at: None,
                response: None,
            })
            .await?;

        info!(
            "Run {} is waiting for authorization ({} link(s))",
            run_id,
            event.args.len()
        );
        Ok(SubmitOutcome::AwaitingAuthorization { run_id, event })
    }

    /// Resolve a pending interrupt and continue the run
    ///
    /// A run can be resolved once. `ignore` resolves it and fails with
    /// [`AuthError::Denied`] without scheduling anything. Under
    /// [`ResumePolicy::Revalidate`], an `accept` while credentials are still
    /// missing fails with [`AuthError::StillNeeded`] and leaves the interrupt
    /// pending.
    pub async fn resume(&self, run_id: &str, response: HumanResponse) -> Result<ScheduledPost> {
        let pending = self
            .db
            .get_pending_interrupt(run_id)
            .await?
            .filter(|p| !p.is_resolved())
            .ok_or_else(|| AuthError::NotPending(run_id.to_string()))?;

        if !pending.event.config.allows(response) {
            return Err(PostgateError::InvalidInput(format!(
                "'{}' is not allowed for run {}",
                response, run_id
            )));
        }

        if response == HumanResponse::Accept && self.policy == ResumePolicy::Revalidate {
            self.revalidate().await?;
        }

        let now = chrono::Utc::now().timestamp();
        if !self.db.resolve_interrupt(run_id, response, now).await? {
            // Another resume got there between the read and the update
            return Err(AuthError::NotPending(run_id.to_string()).into());
        }

        if let Err(e) = InterruptAggregator::resolve(&pending.event, response) {
            warn!("Run {} ended: {}", run_id, e);
            return Err(e);
        }

        info!("Run {} accepted; scheduling", run_id);
        self.scheduler.schedule(&pending.job, pending.flags).await
    }

    async fn revalidate(&self) -> Result<()> {
        let missing: Vec<String> = self
            .gate
            .check_all()
            .await?
            .into_iter()
            .flatten()
            .map(|request| request.provider().to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::StillNeeded(missing.join(", ")).into())
        }
    }
}
