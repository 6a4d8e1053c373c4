//! In-memory store and mock external collaborators for fast unit tests,
//! reused across this crate and `triage-worker`'s pipeline tests.

pub mod memory_store;
pub mod mocks;

pub use memory_store::MemoryStore;
pub use mocks::{MockEmbedder, MockFetcher, MockLlmClassifier, MockNotifier};

#[cfg(test)]
mod integration_tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::traits::store::{JobStore, LockStore, PostStore};
    use crate::types::job::JobPayload;
    use crate::types::post::FetchedPost;
    use crate::types::{Job, Post, RoutingStatus, SystemLock};

    #[tokio::test]
    async fn enqueue_then_reserve_under_single_worker_sets_attempts_one() {
        let store = MemoryStore::new();
        let job = Job::new(JobPayload::ClassifyTweets, Utc::now(), 3);
        store.insert_job(&job).await.unwrap();

        let reserved = store.reserve_next("worker-a", Utc::now()).await.unwrap().unwrap();
        assert_eq!(reserved.id, job.id);
        assert_eq!(reserved.attempts, 1);

        // A second worker sees nothing left to reserve.
        assert!(store.reserve_next("worker-b", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn two_workers_race_for_one_job_exactly_one_wins() {
        let store = MemoryStore::new();
        let job = Job::new(JobPayload::ClassifyTweets, Utc::now(), 3);
        store.insert_job(&job).await.unwrap();

        let a = store.reserve_next("worker-a", Utc::now()).await.unwrap();
        let b = store.reserve_next("worker-b", Utc::now()).await.unwrap();
        assert!(a.is_some());
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn stale_running_job_is_swept() {
        let store = MemoryStore::new();
        let job = Job::new(JobPayload::ClassifyTweets, Utc::now() - Duration::hours(2), 3);
        store.insert_job(&job).await.unwrap();
        store.reserve_next("worker-a", Utc::now() - Duration::hours(2)).await.unwrap();

        let swept = store.sweep_stale_running(Utc::now() - Duration::hours(1)).await.unwrap();
        assert_eq!(swept, 1);
        let reloaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, crate::types::JobStatus::Completed);
    }

    #[tokio::test]
    async fn lock_takeover_when_holder_job_not_running() {
        let store = MemoryStore::new();
        let stale_job_id = Uuid::new_v4();
        let lock = SystemLock {
            key: "classify".to_string(),
            locked_by: SystemLock::job_holder(stale_job_id),
            locked_at: Utc::now() - Duration::hours(2),
            expires_at: Utc::now() - Duration::hours(1),
        };
        store.insert_lock(&lock).await.unwrap();

        // Expired lock: any new holder takes over unconditionally.
        let new_lock = SystemLock {
            key: "classify".to_string(),
            locked_by: "worker-b".to_string(),
            locked_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(60),
        };
        let took_over = store.upsert_lock(&new_lock, None).await.unwrap();
        assert!(took_over);
    }

    #[tokio::test]
    async fn routing_status_never_auto_reverts_to_pending() {
        // Documents the open-question decision: nothing in this crate's
        // public API moves a post back to `pending` once routed.
        let store = MemoryStore::new();
        let post = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: "e1".to_string(),
                created_at: Utc::now(),
                text: "x".to_string(),
                lang: None,
                author_handle: "a".to_string(),
                raw_metadata: serde_json::json!({}),
            },
        );
        let post = store.upsert_post(&post).await.unwrap();

        let mut routed = post.clone();
        routed.mark_routed("policy", 0.9, 0.1, "embed-analyze", Utc::now());
        store.bulk_update_routing(&[routed.clone()]).await.unwrap();

        let mut ignored = routed.clone();
        ignored.mark_ignored("embed-low", Utc::now());
        store.bulk_update_routing(&[ignored.clone()]).await.unwrap();

        let reloaded = store.get_post_by_external_id("e1").await.unwrap().unwrap();
        assert_eq!(reloaded.routing_status, RoutingStatus::Ignored);
        assert_ne!(reloaded.routing_status, RoutingStatus::Pending);
    }

    #[tokio::test]
    async fn insight_upsert_with_identical_payload_only_bumps_updated_at() {
        use crate::traits::store::InsightStore;
        use crate::types::{Insight, Verdict};

        let store = MemoryStore::new();
        let post_id = Uuid::new_v4();
        let first = Insight::new(post_id, "e1", Verdict::Watch, Some("s".into()), Some(3), vec!["policy".into()], None);
        store.upsert_insight(&first).await.unwrap();

        let mut second = first.clone();
        second.updated_at = Utc::now() + Duration::seconds(5);
        store.upsert_insight(&second).await.unwrap();

        let reloaded = store.get_insight("e1").await.unwrap().unwrap();
        assert_eq!(reloaded.summary, first.summary);
        assert_eq!(reloaded.importance, first.importance);
        assert_eq!(reloaded.updated_at, second.updated_at);
    }
}
