//! The claim-dispatch-complete loop a `triage-worker` process runs
//! (spec.md section 4.2). One iteration reserves the oldest due job,
//! routes it to the matching pipeline handler by `JobPayload` variant,
//! and resolves it; an empty queue sleeps for `idle_sleep` before
//! polling again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use triage_core::{
    classify_tweets, classify_tweets_llm, fetch_subscriptions, report_profile, EnqueueOptions,
    JobPayload, JobQueue, LockManager, Store, TriageError,
};

use crate::config::Config;
use crate::external::Collaborators;
use crate::store::PgStore;

/// Runs one job at a time via [`Worker::tick`]; callers own the polling
/// loop and idle-sleep so tests can drive it deterministically.
pub struct Worker {
    store: Arc<dyn Store>,
    pg: Arc<PgStore>,
    queue: JobQueue,
    locks: LockManager,
    collaborators: Collaborators,
    config: Config,
}

impl Worker {
    pub fn new(pg: Arc<PgStore>, collaborators: Collaborators, config: Config) -> Self {
        let store = pg.clone() as Arc<dyn Store>;
        let queue = JobQueue::new(store.clone());
        let locks = LockManager::new(store.clone());
        Self { store, pg, queue, locks, collaborators, config }
    }

    /// Poll once. Returns `true` if a job was claimed and processed,
    /// `false` if the queue was empty (caller should idle-sleep).
    pub async fn tick(&self) -> bool {
        let job = match self.queue.reserve_next(&self.config.worker_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(e) => {
                error!(error = %e, "failed to reserve next job");
                return false;
            }
        };

        let job_id = job.id;
        info!(job_id = %job_id, job_type = job.job_type(), "claimed job");

        let outcome = self.dispatch(job_id, &job.payload).await;

        match outcome {
            Ok(()) => {
                if let Err(e) = self.queue.mark_complete(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job complete");
                }
            }
            Err(TriageError::LockUnavailable { scope, holder }) => {
                warn!(job_id = %job_id, scope, holder, "lock unavailable, requeuing for a short delay");
                if let Err(e) = self.queue.requeue(&job, chrono::Duration::seconds(5), true).await {
                    error!(job_id = %job_id, error = %e, "failed to requeue lock-contended job");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job failed");
                if let Err(e) = self.queue.mark_failed(&job, &e.to_string()).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job failed");
                }
            }
        }
        true
    }

    async fn dispatch(&self, job_id: uuid::Uuid, payload: &JobPayload) -> triage_core::Result<()> {
        match payload {
            JobPayload::FetchSubscriptions { subscription_ids } => {
                let outcome = fetch_subscriptions(
                    &self.store,
                    self.collaborators.fetcher.as_ref(),
                    subscription_ids.as_deref(),
                    self.config.pipeline.fetch_cooldown,
                    self.config.pipeline.fetch_batch_size,
                )
                .await?;
                info!(
                    subscriptions = outcome.subscriptions_fetched,
                    posts = outcome.posts_ingested,
                    "fetch-subscriptions done"
                );
                Ok(())
            }
            JobPayload::ClassifyTweets => {
                let outcome = classify_tweets(
                    &self.store,
                    self.collaborators.embedder.as_ref(),
                    &self.queue,
                    &self.config.pipeline,
                )
                .await?;
                info!(
                    routed = outcome.routed,
                    dispatched = outcome.dispatched_jobs,
                    "classify-tweets done"
                );
                Ok(())
            }
            JobPayload::ClassifyTweetsLlm { post_ids, tag } => {
                let outcome = classify_tweets_llm(
                    job_id,
                    &self.store,
                    self.collaborators.classifier.as_ref(),
                    &self.locks,
                    post_ids,
                    tag,
                    &self.config.pipeline,
                )
                .await?;
                info!(
                    classified = outcome.classified,
                    content_risk = outcome.content_risk_abandoned,
                    max_retries = outcome.max_retries_abandoned,
                    "classify-tweets-llm done"
                );
                Ok(())
            }
            JobPayload::ReportProfile { profile_id, notify, window_end } => {
                self.run_report_profile(*profile_id, *notify, *window_end).await
            }
        }
    }

    async fn run_report_profile(
        &self,
        profile_id: uuid::Uuid,
        notify: bool,
        window_end: chrono::DateTime<Utc>,
    ) -> triage_core::Result<()> {
        let Some(profile) = self.pg.get_report_profile(profile_id).await? else {
            warn!(profile_id = %profile_id, "report profile not found, skipping");
            return Ok(());
        };

        let outcome = report_profile(
            &self.store,
            Some(self.collaborators.embedder.as_ref()),
            Some(self.collaborators.classifier.as_ref()),
            &profile,
            window_end,
            &self.config.pipeline,
        )
        .await?;

        info!(
            profile = %profile.name,
            kept = outcome.kept,
            clusters = outcome.clusters,
            skipped_existing = outcome.skipped_existing,
            "report-profile done"
        );

        if notify && !outcome.skipped_existing {
            if let Some(report_id) = outcome.report_id {
                let targets = self.pg.notify_targets(profile_id).await?;
                if let Some(report) = self.pg.get_report(report_id).await? {
                    for target in &targets {
                        if let Err(e) = self.collaborators.notifier.notify(target, &report.content).await {
                            warn!(profile = %profile.name, target, error = %e, "notify failed");
                        } else {
                            self.pg.mark_report_delivered(report_id).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Sweep jobs stuck `Running` past the configured cutoff back to a
    /// retryable state, guarding against a worker that died mid-job.
    pub async fn sweep_stale(&self) {
        match self.queue.sweep_stale_running(self.config.sweep_cutoff).await {
            Ok(0) => {}
            Ok(n) => info!(swept = n, "swept stale running jobs"),
            Err(e) => error!(error = %e, "stale sweep failed"),
        }
    }

    pub async fn enqueue(&self, payload: JobPayload) {
        match self.queue.enqueue(payload, EnqueueOptions { dedupe: true, ..Default::default() }).await {
            Ok(outcome) if outcome.created => info!(job_id = %outcome.job.id, "enqueued"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "enqueue failed"),
        }
    }

    /// `REPORT_CRON_SCHEDULE` tick: enqueue one `report-profile` job per
    /// enabled profile. Not deduped by type like `enqueue` above, since
    /// the job-type dedupe key can't distinguish one profile's job from
    /// another's (spec.md section 4.2) and `report_profile`'s own
    /// `find_report(profile_id, period_end)` check already makes a
    /// redundant tick a no-op.
    pub async fn enqueue_due_reports(&self) {
        let profiles = match self.pg.list_enabled_report_profiles().await {
            Ok(profiles) => profiles,
            Err(e) => {
                error!(error = %e, "failed to list enabled report profiles");
                return;
            }
        };
        for profile in profiles {
            let payload = JobPayload::ReportProfile {
                profile_id: profile.id,
                notify: true,
                window_end: Utc::now(),
            };
            match self.queue.enqueue(payload, EnqueueOptions::default()).await {
                Ok(outcome) => info!(job_id = %outcome.job.id, profile = %profile.name, "enqueued report-profile tick"),
                Err(e) => error!(error = %e, profile = %profile.name, "failed to enqueue report-profile tick"),
            }
        }
    }

    pub fn pg(&self) -> &Arc<PgStore> {
        &self.pg
    }

    pub fn idle_sleep(&self) -> std::time::Duration {
        self.config.idle_sleep
    }
}
