//! The durable background job queue (spec.md section 4.2).
//!
//! `JobQueue` is a thin orchestrator over `JobStore`: it owns the
//! enqueue-with-dedupe decision and the default retry delay, but leaves
//! the compare-and-set mechanics (`reserve_next`, `sweep_stale_running`)
//! to the store, which is the only layer that can make them atomic
//! against a real backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::traits::Store;
use crate::types::{Job, JobPayload};

/// Default retry backoff applied by `mark_failed` (spec.md section 4.2).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::seconds(5);

/// Default `maxAttempts` when a caller doesn't specify one.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// How long a job may sit `running` before the sweep force-completes it.
pub const DEFAULT_SWEEP_CUTOFF: Duration = Duration::hours(1);

/// Options accepted by `JobQueue::enqueue` (spec.md section 4.2).
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub dedupe: bool,
    pub run_at: Option<DateTime<Utc>>,
    pub max_attempts: Option<i32>,
}

/// Outcome of an enqueue call: the job plus whether it was newly created
/// (`false` means an existing non-terminal job of the same type was
/// returned instead, per the dedupe policy).
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub job: Job,
    pub created: bool,
}

pub struct JobQueue {
    store: Arc<dyn Store>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Enqueue a job, short-circuiting on a non-terminal duplicate of the
    /// same type when `opts.dedupe` is set.
    pub async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> Result<EnqueueOutcome> {
        if opts.dedupe {
            if let Some(existing) = self.store.find_non_terminal_by_type(payload.job_type()).await? {
                return Ok(EnqueueOutcome { job: existing, created: false });
            }
        }
        let job = Job::new(
            payload,
            opts.run_at.unwrap_or_else(Utc::now),
            opts.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        );
        let inserted = self.store.insert_job(&job).await?;
        Ok(EnqueueOutcome { job: inserted, created: true })
    }

    /// Claim the oldest due pending job for `worker_id`, or `None` if the
    /// queue is empty right now.
    pub async fn reserve_next(&self, worker_id: &str) -> Result<Option<Job>> {
        self.store.reserve_next(worker_id, Utc::now()).await
    }

    pub async fn mark_complete(&self, id: Uuid) -> Result<()> {
        self.store.mark_complete(id).await
    }

    /// Fail a job. Retries with `DEFAULT_RETRY_DELAY` until `maxAttempts`
    /// is exhausted, at which point the store moves it to `failed`.
    pub async fn mark_failed(&self, job: &Job, error: &str) -> Result<()> {
        warn!(job_id = %job.id, job_type = job.job_type(), error, "job failed");
        self.store
            .mark_failed(job.id, error, DEFAULT_RETRY_DELAY, Utc::now())
            .await
    }

    /// Requeue a job without treating it as a failure (e.g. lock
    /// unavailable). `revert_attempt` undoes the attempt increment
    /// `reserve_next` applied, so this doesn't count against
    /// `maxAttempts`.
    pub async fn requeue(&self, job: &Job, delay: Duration, revert_attempt: bool) -> Result<()> {
        self.store
            .requeue(job.id, delay, revert_attempt, Utc::now())
            .await
    }

    /// Extend a running job's lease so a long `classify-tweets-llm` batch
    /// doesn't get reclaimed by `sweep_stale_running` mid-flight
    /// (SPEC_FULL.md section 10.5). Returns `false` if the job is no
    /// longer running by the time the heartbeat lands; callers should
    /// treat that as "someone else already took it back" and stop.
    pub async fn heartbeat(&self, id: Uuid) -> Result<bool> {
        self.store.heartbeat(id, Utc::now()).await
    }

    /// Force-complete any job that has been `running` longer than
    /// `cutoff`, so a crashed worker can't deadlock the queue (spec.md
    /// section 4.2, 7-6).
    pub async fn sweep_stale_running(&self, cutoff: Duration) -> Result<u64> {
        let swept = self.store.sweep_stale_running(Utc::now() - cutoff).await?;
        if swept > 0 {
            info!(count = swept, "swept stale running jobs");
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use crate::types::JobStatus;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn dedupe_returns_existing_non_terminal_job() {
        let q = queue();
        let first = q
            .enqueue(JobPayload::ClassifyTweets, EnqueueOptions { dedupe: true, ..Default::default() })
            .await
            .unwrap();
        assert!(first.created);

        let second = q
            .enqueue(JobPayload::ClassifyTweets, EnqueueOptions { dedupe: true, ..Default::default() })
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.job.id, first.job.id);
    }

    #[tokio::test]
    async fn without_dedupe_each_enqueue_is_new() {
        let q = queue();
        let a = q.enqueue(JobPayload::ClassifyTweets, EnqueueOptions::default()).await.unwrap();
        let b = q.enqueue(JobPayload::ClassifyTweets, EnqueueOptions::default()).await.unwrap();
        assert_ne!(a.job.id, b.job.id);
    }

    #[tokio::test]
    async fn enqueue_then_reserve_has_attempts_one() {
        let q = queue();
        let outcome = q.enqueue(JobPayload::ClassifyTweets, EnqueueOptions::default()).await.unwrap();
        let reserved = q.reserve_next("worker-a").await.unwrap().unwrap();
        assert_eq!(reserved.id, outcome.job.id);
        assert_eq!(reserved.attempts, 1);
    }

    #[tokio::test]
    async fn mark_failed_retries_until_max_attempts_then_fails() {
        let q = queue();
        let outcome = q
            .enqueue(
                JobPayload::ClassifyTweets,
                EnqueueOptions { max_attempts: Some(2), ..Default::default() },
            )
            .await
            .unwrap();

        let job = q.reserve_next("worker-a").await.unwrap().unwrap();
        q.mark_failed(&job, "boom").await.unwrap();
        let reloaded = q.store.get_job(outcome.job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Pending);

        let job = q.reserve_next("worker-a").await.unwrap().unwrap();
        q.mark_failed(&job, "boom again").await.unwrap();
        let reloaded = q.store.get_job(outcome.job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn heartbeat_extends_lease_on_running_job_only() {
        let q = queue();
        let outcome = q.enqueue(JobPayload::ClassifyTweets, EnqueueOptions::default()).await.unwrap();
        let job = q.reserve_next("worker-a").await.unwrap().unwrap();
        let before = job.locked_at.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(q.heartbeat(job.id).await.unwrap());
        let reloaded = q.store.get_job(outcome.job.id).await.unwrap().unwrap();
        assert!(reloaded.locked_at.unwrap() > before);

        q.mark_complete(job.id).await.unwrap();
        assert!(!q.heartbeat(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn requeue_with_revert_attempt_undoes_increment() {
        let q = queue();
        let outcome = q.enqueue(JobPayload::ClassifyTweets, EnqueueOptions::default()).await.unwrap();
        let job = q.reserve_next("worker-a").await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        q.requeue(&job, Duration::milliseconds(0), true).await.unwrap();
        let reloaded = q.store.get_job(outcome.job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.attempts, 0);
        assert_eq!(reloaded.status, JobStatus::Pending);
    }
}
