//! Storage traits.
//!
//! Split into focused traits per entity (mirroring the teacher's
//! `PageCache`/`SummaryCache`/`EmbeddingStore` split) so a backend can
//! implement only what it needs and callers can depend on the narrowest
//! trait that satisfies them. `Store` is the composite used by the
//! pipeline, implemented via a blanket impl.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    AiRun, Insight, Job, JobStatus, NotificationConfig, Post, PostEmbedding, Report, RoutingCache,
    Subscription, SystemLock,
};

/// An insight joined with its post's window-relevant fields, used by the
/// report generator (spec.md section 4.6 step 1).
#[derive(Debug, Clone)]
pub struct InsightWithPost {
    pub insight: Insight,
    pub post: Post,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn upsert_subscription(&self, sub: &Subscription) -> Result<()>;
    async fn get_subscription_by_handle(&self, handle: &str) -> Result<Option<Subscription>>;
    /// Subscribed accounts whose cooldown has elapsed, oldest-fetched first.
    async fn list_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<Subscription>>;
    /// Explicit subset fetch, used when a `fetch-subscriptions` job
    /// payload pins specific subscription ids instead of sweeping
    /// everything due.
    async fn list_subscriptions_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Subscription>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Idempotent upsert keyed on `external_id`.
    async fn upsert_post(&self, post: &Post) -> Result<Post>;
    async fn get_post_by_external_id(&self, external_id: &str) -> Result<Option<Post>>;
    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>>;
    /// All posts still `Pending`, for the rule-filter stage.
    async fn list_pending_posts(&self, limit: i64) -> Result<Vec<Post>>;
    /// Posts `Routed` under `tag`, oldest-routed first.
    async fn list_routed_by_tag(&self, tag: &str, limit: i64) -> Result<Vec<Post>>;
    async fn count_routed_by_tag(&self, tag: &str) -> Result<i64>;
    /// Write back routing decisions. Chunked at 100 rows per transaction
    /// by callers per spec.md section 4.1; this method itself applies
    /// one already-chunked batch.
    async fn bulk_update_routing(&self, posts: &[Post]) -> Result<()>;
    /// Conditional claim for LLM dispatch: only posts still `Routed` with
    /// `llm_queued_at = null` are updated; returns the ids actually
    /// claimed (spec.md section 4.4.3 compare-and-set).
    async fn claim_for_llm_dispatch(&self, ids: &[Uuid], now: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Idempotent upsert keyed on `external_id`; identical payload is a
    /// no-op on all fields except `updated_at`.
    async fn upsert_insight(&self, insight: &Insight) -> Result<()>;
    async fn get_insight(&self, external_id: &str) -> Result<Option<Insight>>;
    /// Insights (joined with posts) whose post's `source_timestamp` falls
    /// in `[start, end]` and whose verdict is not `Ignore`.
    async fn list_insights_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InsightWithPost>>;
}

#[async_trait]
pub trait PostEmbeddingStore: Send + Sync {
    async fn get_embedding(&self, post_id: Uuid) -> Result<Option<PostEmbedding>>;
    async fn upsert_embedding(&self, embedding: &PostEmbedding) -> Result<()>;
}

#[async_trait]
pub trait RoutingCacheStore: Send + Sync {
    async fn load_routing_cache(&self) -> Result<Option<RoutingCache>>;
    /// Atomic upsert. Implementations should reject (return
    /// `TriageError::Stale`) if an existing row's model/dimension
    /// disagrees with `cache`'s, forcing an explicit rebuild instead of
    /// silently mixing embedding spaces.
    async fn save_routing_cache(&self, cache: &RoutingCache) -> Result<()>;

    /// Tags seen on any Insight in the last `window_days`, used to decide
    /// which tags the rebuild needs samples for (spec.md section 4.4.2).
    async fn distinct_recent_tags(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Posts tagged `tag` with `importance >= min_importance` and
    /// verdict != ignore, most-recent first, used to build a tag's
    /// positive sample pool. Only posts with a persisted embedding are
    /// usable; callers filter out the rest.
    async fn list_routing_samples(
        &self,
        tag: &str,
        since: DateTime<Utc>,
        min_importance: u8,
        limit: i64,
    ) -> Result<Vec<InsightWithPost>>;

    /// Posts judged `ignore`, most-recent first, used to build the
    /// negative sample bucket.
    async fn list_negative_samples(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<InsightWithPost>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<Job>;
    /// Any non-terminal job whose payload has the same `job_type` as `job_type`.
    async fn find_non_terminal_by_type(&self, job_type: &str) -> Result<Option<Job>>;
    /// Atomically claim the oldest due pending job for `worker_id`.
    /// Returns `None` if no job is due. Implementations use
    /// compare-and-set (id + status=pending) so concurrent workers never
    /// double-claim (spec.md section 4.2).
    async fn reserve_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>>;
    async fn mark_complete(&self, id: Uuid) -> Result<()>;
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_delay: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn requeue(
        &self,
        id: Uuid,
        delay: chrono::Duration,
        revert_attempt: bool,
        now: DateTime<Utc>,
    ) -> Result<()>;
    /// Force-complete any job `Running` whose `locked_at` predates `cutoff`.
    /// Returns the number of jobs swept.
    async fn sweep_stale_running(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;
    /// True if `id` refers to a live (status=Running) job. Used by
    /// `LockManager` staleness detection when a holder looks like
    /// `job:<id>`.
    async fn is_job_running(&self, id: Uuid) -> Result<bool> {
        Ok(matches!(
            self.get_job(id).await?,
            Some(job) if job.status == JobStatus::Running
        ))
    }
    /// Extend a running job's lease by touching `locked_at` to `now`,
    /// without disturbing `attempts` or `status`. Only applies if the job
    /// is still `Running`; returns `true` if the lease was extended.
    /// Lets a long `classify-tweets-llm` batch outlive the sweep cutoff
    /// instead of being reclaimed mid-flight.
    async fn heartbeat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait AiRunStore: Send + Sync {
    async fn insert_ai_run(&self, run: &AiRun) -> Result<()>;
    async fn update_ai_run(&self, run: &AiRun) -> Result<()>;
}

#[async_trait]
pub trait NotificationConfigStore: Send + Sync {
    /// `None` if the control plane has never written a config row yet.
    async fn load_notification_config(&self) -> Result<Option<NotificationConfig>>;
}

#[async_trait]
pub trait LockStore: Send + Sync {
    async fn get_lock(&self, key: &str) -> Result<Option<SystemLock>>;
    /// Insert a brand-new lock row. Fails if one already exists
    /// (callers only call this after confirming absence within the same
    /// transaction).
    async fn insert_lock(&self, lock: &SystemLock) -> Result<()>;
    /// Compare-and-set refresh/take-over: succeeds only if the current
    /// row's `locked_by` equals `expected_holder` (refresh) or the row
    /// is being taken over wholesale (pass `None` to skip the check).
    /// Returns `true` if the update applied.
    async fn upsert_lock(&self, lock: &SystemLock, expected_holder: Option<&str>) -> Result<bool>;
    /// Release iff `key` is currently held by `holder`. Returns `true` if released.
    async fn release_lock(&self, key: &str, holder: &str) -> Result<bool>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_report(&self, profile_id: Uuid, period_end: DateTime<Utc>) -> Result<Option<Report>>;
    async fn insert_report(&self, report: &Report) -> Result<()>;
}

/// Composite trait used by the pipeline and report generator.
pub trait Store:
    SubscriptionStore
    + PostStore
    + InsightStore
    + PostEmbeddingStore
    + RoutingCacheStore
    + JobStore
    + LockStore
    + ReportStore
    + AiRunStore
    + NotificationConfigStore
{
}

impl<T> Store for T where
    T: SubscriptionStore
        + PostStore
        + InsightStore
        + PostEmbeddingStore
        + RoutingCacheStore
        + JobStore
        + LockStore
        + ReportStore
        + AiRunStore
        + NotificationConfigStore
{
}
