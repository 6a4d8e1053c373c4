//! Cross-process mutual exclusion (spec.md section 4.3).
//!
//! A `SystemLock` row is held iff `locked_by` is non-null and either
//! `expires_at` is still in the future, or the holder is a queue job
//! that's still `running`. The second clause lets a long job keep its
//! lock past a short TTL as long as it's alive, while still letting a
//! crashed job's lock be taken over immediately instead of waiting out
//! the full TTL.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::Result;
use crate::traits::Store;
use crate::types::SystemLock;

/// No lock is granted a TTL shorter than this, regardless of what the
/// caller requests, so a busy acquire/release cycle can't thrash the
/// lock row.
pub const MIN_TTL: Duration = Duration::minutes(1);

pub struct LockManager {
    store: Arc<dyn Store>,
}

impl LockManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn floor_ttl(ttl: Duration) -> Duration {
        if ttl < MIN_TTL { MIN_TTL } else { ttl }
    }

    /// True if `lock` is no longer effectively held: its TTL has lapsed,
    /// or its holder is a job that isn't running anymore.
    async fn is_stale(&self, lock: &SystemLock, now: DateTime<Utc>) -> Result<bool> {
        if now >= lock.expires_at {
            return Ok(true);
        }
        if let Some(job_id) = SystemLock::holder_job_id(&lock.locked_by) {
            if let Ok(id) = job_id.parse() {
                return Ok(!self.store.is_job_running(id).await?);
            }
        }
        Ok(false)
    }

    /// Attempt to acquire `key` for `holder`. Returns `true` on success:
    /// either the lock didn't exist, or it existed but was stale and this
    /// call took it over. Returns `false` if another holder has it live.
    pub async fn acquire(&self, key: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool> {
        let ttl = Self::floor_ttl(ttl);
        let new_lock = SystemLock {
            key: key.to_string(),
            locked_by: holder.to_string(),
            locked_at: now,
            expires_at: now + ttl,
        };

        match self.store.get_lock(key).await? {
            None => match self.store.insert_lock(&new_lock).await {
                Ok(()) => Ok(true),
                // Lost a race with a concurrent acquirer inserting first.
                Err(crate::error::TriageError::LockUnavailable { .. }) => Ok(false),
                Err(e) => Err(e),
            },
            Some(existing) => {
                if !self.is_stale(&existing, now).await? {
                    return Ok(false);
                }
                info!(key, previous_holder = existing.locked_by, new_holder = holder, "taking over stale lock");
                // Compare-and-set against the holder we just observed, so
                // a concurrent taker can't overwrite a lock we already won.
                self.store.upsert_lock(&new_lock, Some(&existing.locked_by)).await
            }
        }
    }

    /// Extend `holder`'s own lock without releasing it. Returns `false`
    /// if `holder` no longer owns the lock (it was taken over already).
    pub async fn renew(&self, key: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool> {
        let ttl = Self::floor_ttl(ttl);
        let renewed = SystemLock {
            key: key.to_string(),
            locked_by: holder.to_string(),
            locked_at: now,
            expires_at: now + ttl,
        };
        self.store.upsert_lock(&renewed, Some(holder)).await
    }

    pub async fn release(&self, key: &str, holder: &str) -> Result<bool> {
        self.store.release_lock(key, holder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use crate::types::{Job, JobPayload};

    fn manager() -> (LockManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (LockManager::new(store.clone()), store)
    }

    #[tokio::test]
    async fn acquire_on_absent_lock_succeeds() {
        let (m, _) = manager();
        let now = Utc::now();
        assert!(m.acquire("classify", "worker-a", Duration::minutes(5), now).await.unwrap());
    }

    #[tokio::test]
    async fn second_acquire_while_live_fails() {
        let (m, _) = manager();
        let now = Utc::now();
        assert!(m.acquire("classify", "worker-a", Duration::minutes(5), now).await.unwrap());
        assert!(!m.acquire("classify", "worker-b", Duration::minutes(5), now).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_after_expiry_takes_over() {
        let (m, _) = manager();
        let now = Utc::now();
        assert!(m.acquire("classify", "worker-a", Duration::minutes(1), now).await.unwrap());
        let later = now + Duration::minutes(2);
        assert!(m.acquire("classify", "worker-b", Duration::minutes(5), later).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_takes_over_when_holder_job_not_running() {
        let (m, store) = manager();
        let now = Utc::now();
        let job = Job::new(JobPayload::ClassifyTweets, now, 3);
        store.insert_job(&job).await.unwrap();
        // The job is enqueued but never reserved, so it's not running:
        // the lock it nominally holds is stale even before its TTL lapses.
        let held_by_job = SystemLock {
            key: "classify".to_string(),
            locked_by: SystemLock::job_holder(job.id),
            locked_at: now,
            expires_at: now + Duration::minutes(30),
        };
        store.insert_lock(&held_by_job).await.unwrap();

        assert!(m.acquire("classify", "worker-b", Duration::minutes(5), now).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_respects_live_job_holder_even_past_short_ttl() {
        let (m, store) = manager();
        let now = Utc::now();
        let job = Job::new(JobPayload::ClassifyTweets, now, 3);
        store.insert_job(&job).await.unwrap();
        store.reserve_next("w", now).await.unwrap();

        let held_by_job = SystemLock {
            key: "classify".to_string(),
            locked_by: SystemLock::job_holder(job.id),
            locked_at: now,
            expires_at: now + Duration::seconds(1),
        };
        store.insert_lock(&held_by_job).await.unwrap();

        let later = now + Duration::seconds(5);
        assert!(!m.acquire("classify", "worker-b", Duration::minutes(5), later).await.unwrap());
    }

    #[tokio::test]
    async fn release_only_succeeds_for_current_holder() {
        let (m, _) = manager();
        let now = Utc::now();
        m.acquire("classify", "worker-a", Duration::minutes(5), now).await.unwrap();
        assert!(!m.release("classify", "worker-b").await.unwrap());
        assert!(m.release("classify", "worker-a").await.unwrap());
    }

    #[tokio::test]
    async fn renew_extends_ttl_for_current_holder_only() {
        let (m, _) = manager();
        let now = Utc::now();
        m.acquire("classify", "worker-a", Duration::minutes(1), now).await.unwrap();
        assert!(m.renew("classify", "worker-a", Duration::minutes(5), now).await.unwrap());
        assert!(!m.renew("classify", "worker-b", Duration::minutes(5), now).await.unwrap());
    }

    #[tokio::test]
    async fn floor_ttl_enforces_minimum() {
        assert_eq!(LockManager::floor_ttl(Duration::seconds(1)), MIN_TTL);
        assert_eq!(LockManager::floor_ttl(Duration::minutes(10)), Duration::minutes(10));
    }

}
