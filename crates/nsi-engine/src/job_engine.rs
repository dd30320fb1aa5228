//! The worker pool: claims ready jobs from the [`nsi_store::JobStore`] and
//! dispatches to [`crate::handlers::run`]. Per-connection serialization of
//! state transitions happens inside the handlers themselves (see
//! [`crate::context::EngineContext::connection_lock`]), not here — a job's
//! NRM backend call or requester callback delivery can run unlocked and take
//! as long as it needs without blocking other jobs for the same connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use nsi_store::JobRecord;

use crate::context::EngineContext;
use crate::handlers;

/// How many times a job is retried before being left `failed` for good.
/// Distinct from the requester callback's own retry ceiling — this bounds
/// transient backend/store errors surfacing from a handler.
const MAX_JOB_ATTEMPTS: u32 = 5;
const JOB_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct JobEngine {
    ctx: EngineContext,
    concurrency: usize,
}

impl JobEngine {
    pub fn new(ctx: EngineContext) -> Self {
        let concurrency = ctx.config.worker_pool_size.max(1);
        Self { ctx, concurrency }
    }

    /// Re-enqueues everything left `Pending`/`Running` from a prior process
    /// lifetime. Query jobs have no persisted input to resume from and are
    /// intentionally dropped (the store never creates them in the first
    /// place, so there is nothing to filter here — left as a documented
    /// carry-over of the source system's behaviour).
    pub async fn recover(&self) -> Result<(), crate::error::EngineError> {
        let pending = self.ctx.jobs.recover_pending().await?;
        let mut requeued = 0;
        for job in &pending {
            if job.state == nsi_store::JobState::Running {
                self.ctx.jobs.reschedule(job.job_id, Utc::now()).await?;
                requeued += 1;
            }
        }
        info!(total = pending.len(), requeued, "recovered pending jobs from prior run");
        Ok(())
    }

    /// Runs the dispatch loop until cancelled. Intended to be spawned as a
    /// long-lived task per worker slot.
    pub async fn dispatch_loop(self: Arc<Self>) {
        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            let engine = self.clone();
            workers.spawn(async move { engine.worker_loop(worker_id).await });
        }
        while workers.join_next().await.is_some() {}
    }

    async fn worker_loop(&self, worker_id: usize) {
        loop {
            let claimed = match self.ctx.jobs.claim_ready(Utc::now(), 1).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to claim jobs");
                    tokio::time::sleep(JOB_POLL_INTERVAL).await;
                    continue;
                }
            };
            if claimed.is_empty() {
                tokio::time::sleep(JOB_POLL_INTERVAL).await;
                continue;
            }
            for job in claimed {
                self.run_one(worker_id, job).await;
            }
        }
    }

    async fn run_one(&self, worker_id: usize, job: JobRecord) {
        let job_id = job.job_id;
        let result = handlers::run(&self.ctx, &job).await;
        match result {
            Ok(()) => {
                if let Err(e) = self.ctx.jobs.mark_done(job_id).await {
                    error!(worker_id, %job_id, error = %e, "failed to mark job done");
                }
            }
            Err(e) => self.handle_failure(worker_id, &job, e).await,
        }
    }

    async fn handle_failure(&self, worker_id: usize, job: &JobRecord, error: crate::error::EngineError) {
        let job_id = job.job_id;
        if job.attempts + 1 >= MAX_JOB_ATTEMPTS {
            warn!(worker_id, %job_id, job_kind = %job.job_kind, error = %error, "job exhausted retries, marking failed");
            if let Err(e) = self.ctx.jobs.mark_failed(job_id, error.to_string()).await {
                error!(worker_id, %job_id, error = %e, "failed to mark job failed");
            }
            return;
        }
        let backoff = Duration::from_secs(2u64.saturating_pow(job.attempts));
        warn!(worker_id, %job_id, job_kind = %job.job_kind, error = %error, ?backoff, "job failed, rescheduling");
        if let Err(e) = self.ctx.jobs.reschedule(job_id, Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default()).await {
            error!(worker_id, %job_id, error = %e, "failed to reschedule job");
        }
    }
}
