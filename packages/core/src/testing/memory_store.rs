//! In-memory `Store` implementation for fast, deterministic unit tests.
//!
//! Not suitable for production: no durability, no real transactions. It
//! exists to exercise the job queue, lock manager, and pipeline handlers
//! without a database.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{Result, TriageError};
use crate::traits::store::{
    AiRunStore, InsightStore, InsightWithPost, JobStore, LockStore, NotificationConfigStore,
    PostEmbeddingStore, PostStore, ReportStore, RoutingCacheStore, SubscriptionStore,
};
use crate::types::{
    AiRun, Insight, Job, JobStatus, NotificationConfig, Post, PostEmbedding, Report, RoutingCache,
    RoutingStatus, Subscription, SystemLock, Verdict,
};

#[derive(Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    posts: RwLock<HashMap<Uuid, Post>>,
    insights: RwLock<HashMap<String, Insight>>,
    embeddings: RwLock<HashMap<Uuid, PostEmbedding>>,
    routing_cache: RwLock<Option<RoutingCache>>,
    jobs: RwLock<HashMap<Uuid, Job>>,
    locks: RwLock<HashMap<String, SystemLock>>,
    reports: RwLock<HashMap<(Option<Uuid>, DateTime<Utc>), Report>>,
    ai_runs: RwLock<HashMap<Uuid, AiRun>>,
    notification_config: RwLock<Option<NotificationConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_count(&self) -> usize {
        self.posts.read().unwrap().len()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert_subscription(&self, sub: &Subscription) -> Result<()> {
        let mut subs = self.subscriptions.write().unwrap();
        if let Some(existing) = subs.values_mut().find(|s| s.handle == sub.handle) {
            *existing = sub.clone();
        } else {
            subs.insert(sub.id, sub.clone());
        }
        Ok(())
    }

    async fn get_subscription_by_handle(&self, handle: &str) -> Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .unwrap()
            .values()
            .find(|s| s.handle == handle)
            .cloned())
    }

    async fn list_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        cooldown: Duration,
        limit: i64,
    ) -> Result<Vec<Subscription>> {
        let mut due: Vec<Subscription> = self
            .subscriptions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.is_due(now, cooldown))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.last_fetched_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn list_subscriptions_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.read().unwrap();
        Ok(ids.iter().filter_map(|id| subs.get(id).cloned()).collect())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn upsert_post(&self, post: &Post) -> Result<Post> {
        let mut posts = self.posts.write().unwrap();
        if let Some(existing) = posts.values_mut().find(|p| p.external_id == post.external_id) {
            *existing = post.clone();
            return Ok(existing.clone());
        }
        posts.insert(post.id, post.clone());
        Ok(post.clone())
    }

    async fn get_post_by_external_id(&self, external_id: &str) -> Result<Option<Post>> {
        Ok(self
            .posts
            .read()
            .unwrap()
            .values()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        let posts = self.posts.read().unwrap();
        Ok(ids.iter().filter_map(|id| posts.get(id).cloned()).collect())
    }

    async fn list_pending_posts(&self, limit: i64) -> Result<Vec<Post>> {
        let mut pending: Vec<Post> = self
            .posts
            .read()
            .unwrap()
            .values()
            .filter(|p| p.routing_status == RoutingStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_routed_by_tag(&self, tag: &str, limit: i64) -> Result<Vec<Post>> {
        let mut routed: Vec<Post> = self
            .posts
            .read()
            .unwrap()
            .values()
            .filter(|p| {
                p.routing_status == RoutingStatus::Routed && p.routing_tag.as_deref() == Some(tag)
            })
            .cloned()
            .collect();
        routed.sort_by_key(|p| p.routed_at);
        routed.truncate(limit.max(0) as usize);
        Ok(routed)
    }

    async fn count_routed_by_tag(&self, tag: &str) -> Result<i64> {
        Ok(self
            .posts
            .read()
            .unwrap()
            .values()
            .filter(|p| {
                p.routing_status == RoutingStatus::Routed && p.routing_tag.as_deref() == Some(tag)
            })
            .count() as i64)
    }

    async fn bulk_update_routing(&self, posts: &[Post]) -> Result<()> {
        let mut store = self.posts.write().unwrap();
        for post in posts {
            store.insert(post.id, post.clone());
        }
        Ok(())
    }

    async fn claim_for_llm_dispatch(&self, ids: &[Uuid], now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut store = self.posts.write().unwrap();
        let mut claimed = Vec::new();
        for id in ids {
            if let Some(post) = store.get_mut(id) {
                if post.routing_status == RoutingStatus::Routed && post.llm_queued_at.is_none() {
                    post.mark_llm_queued(now);
                    claimed.push(*id);
                }
            }
        }
        Ok(claimed)
    }
}

#[async_trait]
impl InsightStore for MemoryStore {
    async fn upsert_insight(&self, insight: &Insight) -> Result<()> {
        let mut insights = self.insights.write().unwrap();
        match insights.get_mut(&insight.external_id) {
            Some(existing) if same_insight_payload(existing, insight) => {
                existing.updated_at = insight.updated_at;
            }
            _ => {
                insights.insert(insight.external_id.clone(), insight.clone());
            }
        }
        Ok(())
    }

    async fn get_insight(&self, external_id: &str) -> Result<Option<Insight>> {
        Ok(self.insights.read().unwrap().get(external_id).cloned())
    }

    async fn list_insights_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InsightWithPost>> {
        let posts = self.posts.read().unwrap();
        let insights = self.insights.read().unwrap();
        let mut out = Vec::new();
        for insight in insights.values() {
            if insight.verdict == Verdict::Ignore {
                continue;
            }
            let Some(post) = posts.values().find(|p| p.external_id == insight.external_id) else {
                continue;
            };
            if post.source_timestamp >= start && post.source_timestamp <= end {
                out.push(InsightWithPost {
                    insight: insight.clone(),
                    post: post.clone(),
                });
            }
        }
        Ok(out)
    }
}

fn same_insight_payload(a: &Insight, b: &Insight) -> bool {
    a.verdict == b.verdict && a.summary == b.summary && a.importance == b.importance && a.tags == b.tags && a.suggestion == b.suggestion
}

#[async_trait]
impl PostEmbeddingStore for MemoryStore {
    async fn get_embedding(&self, post_id: Uuid) -> Result<Option<PostEmbedding>> {
        Ok(self.embeddings.read().unwrap().get(&post_id).cloned())
    }

    async fn upsert_embedding(&self, embedding: &PostEmbedding) -> Result<()> {
        self.embeddings
            .write()
            .unwrap()
            .insert(embedding.post_id, embedding.clone());
        Ok(())
    }
}

#[async_trait]
impl RoutingCacheStore for MemoryStore {
    async fn load_routing_cache(&self) -> Result<Option<RoutingCache>> {
        Ok(self.routing_cache.read().unwrap().clone())
    }

    async fn save_routing_cache(&self, cache: &RoutingCache) -> Result<()> {
        let mut slot = self.routing_cache.write().unwrap();
        if let Some(existing) = slot.as_ref() {
            if existing.model != cache.model || existing.dimensions != cache.dimensions {
                return Err(TriageError::Stale(format!(
                    "routing cache model/dimension mismatch: stored {}/{} vs {}/{}",
                    existing.model, existing.dimensions, cache.model, cache.dimensions
                )));
            }
        }
        *slot = Some(cache.clone());
        Ok(())
    }

    async fn distinct_recent_tags(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let posts = self.posts.read().unwrap();
        let insights = self.insights.read().unwrap();
        let mut tags: Vec<String> = insights
            .values()
            .filter(|i| i.verdict != Verdict::Ignore)
            .filter(|i| {
                posts
                    .values()
                    .find(|p| p.external_id == i.external_id)
                    .map(|p| p.source_timestamp >= since)
                    .unwrap_or(false)
            })
            .flat_map(|i| i.tags.clone())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn list_routing_samples(
        &self,
        tag: &str,
        since: DateTime<Utc>,
        min_importance: u8,
        limit: i64,
    ) -> Result<Vec<InsightWithPost>> {
        let posts = self.posts.read().unwrap();
        let insights = self.insights.read().unwrap();
        let mut out: Vec<InsightWithPost> = insights
            .values()
            .filter(|i| {
                i.verdict != Verdict::Ignore
                    && i.importance.unwrap_or(0) >= min_importance
                    && i.tags.iter().any(|t| t == tag)
            })
            .filter_map(|i| {
                posts
                    .values()
                    .find(|p| p.external_id == i.external_id && p.source_timestamp >= since)
                    .map(|p| InsightWithPost { insight: i.clone(), post: p.clone() })
            })
            .collect();
        out.sort_by(|a, b| b.post.source_timestamp.cmp(&a.post.source_timestamp));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn list_negative_samples(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<InsightWithPost>> {
        let posts = self.posts.read().unwrap();
        let insights = self.insights.read().unwrap();
        let mut out: Vec<InsightWithPost> = insights
            .values()
            .filter(|i| i.verdict == Verdict::Ignore)
            .filter_map(|i| {
                posts
                    .values()
                    .find(|p| p.external_id == i.external_id && p.source_timestamp >= since)
                    .map(|p| InsightWithPost { insight: i.clone(), post: p.clone() })
            })
            .collect();
        out.sort_by(|a, b| b.post.source_timestamp.cmp(&a.post.source_timestamp));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<Job> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn find_non_terminal_by_type(&self, job_type: &str) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .values()
            .find(|j| j.is_non_terminal() && j.job_type() == job_type)
            .cloned())
    }

    async fn reserve_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().unwrap();
        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
            .min_by_key(|j| j.scheduled_at)
            .map(|j| j.id);
        let Some(id) = next_id else { return Ok(None) };
        let job = jobs.get_mut(&id).unwrap();
        job.status = JobStatus::Running;
        job.locked_at = Some(now);
        job.locked_by = Some(worker_id.to_string());
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_complete(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| TriageError::NotFound(id.to_string()))?;
        job.status = JobStatus::Completed;
        job.locked_at = None;
        job.locked_by = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_delay: Duration, now: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| TriageError::NotFound(id.to_string()))?;
        job.last_error = Some(error.to_string());
        if job.attempts < job.max_attempts {
            job.status = JobStatus::Pending;
            job.scheduled_at = now + retry_delay;
            job.locked_at = None;
            job.locked_by = None;
        } else {
            job.status = JobStatus::Failed;
        }
        job.updated_at = now;
        Ok(())
    }

    async fn requeue(&self, id: Uuid, delay: Duration, revert_attempt: bool, now: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| TriageError::NotFound(id.to_string()))?;
        job.status = JobStatus::Pending;
        job.scheduled_at = now + delay;
        job.locked_at = None;
        job.locked_by = None;
        if revert_attempt {
            job.attempts = (job.attempts - 1).max(0);
        }
        job.updated_at = now;
        Ok(())
    }

    async fn sweep_stale_running(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.write().unwrap();
        let mut swept = 0u64;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running && job.locked_at.map(|t| t < cutoff).unwrap_or(false) {
                job.status = JobStatus::Completed;
                job.updated_at = Utc::now();
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().unwrap().get(&id).cloned())
    }

    async fn heartbeat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut jobs = self.jobs.write().unwrap();
        let Some(job) = jobs.get_mut(&id) else { return Ok(false) };
        if job.status != JobStatus::Running {
            return Ok(false);
        }
        job.locked_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn get_lock(&self, key: &str) -> Result<Option<SystemLock>> {
        Ok(self.locks.read().unwrap().get(key).cloned())
    }

    async fn insert_lock(&self, lock: &SystemLock) -> Result<()> {
        let mut locks = self.locks.write().unwrap();
        if locks.contains_key(&lock.key) {
            return Err(TriageError::LockUnavailable {
                scope: lock.key.clone(),
                holder: lock.locked_by.clone(),
            });
        }
        locks.insert(lock.key.clone(), lock.clone());
        Ok(())
    }

    async fn upsert_lock(&self, lock: &SystemLock, expected_holder: Option<&str>) -> Result<bool> {
        let mut locks = self.locks.write().unwrap();
        match (locks.get(&lock.key), expected_holder) {
            (Some(existing), Some(expected)) if existing.locked_by == expected => {
                locks.insert(lock.key.clone(), lock.clone());
                Ok(true)
            }
            (_, None) => {
                locks.insert(lock.key.clone(), lock.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, key: &str, holder: &str) -> Result<bool> {
        let mut locks = self.locks.write().unwrap();
        if locks.get(key).map(|l| l.locked_by.as_str()) == Some(holder) {
            locks.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_report(&self, profile_id: Uuid, period_end: DateTime<Utc>) -> Result<Option<Report>> {
        Ok(self.reports.read().unwrap().get(&(Some(profile_id), period_end)).cloned())
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        self.reports
            .write()
            .unwrap()
            .insert((report.profile_id, report.period_end), report.clone());
        Ok(())
    }
}

#[async_trait]
impl AiRunStore for MemoryStore {
    async fn insert_ai_run(&self, run: &AiRun) -> Result<()> {
        self.ai_runs.write().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn update_ai_run(&self, run: &AiRun) -> Result<()> {
        self.ai_runs.write().unwrap().insert(run.id, run.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationConfigStore for MemoryStore {
    async fn load_notification_config(&self) -> Result<Option<NotificationConfig>> {
        Ok(self.notification_config.read().unwrap().clone())
    }
}
