//! Integration tests against a real Postgres instance, matching the
//! teacher's split: fast unit/in-memory tests live under `triage-core`'s
//! `testing` module, these run only when `DATABASE_URL` is set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use triage_core::testing::{MockEmbedder, MockFetcher, MockLlmClassifier, MockNotifier};
use triage_core::types::post::FetchedPost;
use triage_core::{JobPayload, PipelineConfig, Subscription, SubscriptionStore};
use triage_worker::config::Config;
use triage_worker::external::Collaborators;
use triage_worker::store::{run_migrations, PgStore};
use triage_worker::worker::Worker;

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        openai_api_key: String::new(),
        timeline_service_url: String::new(),
        worker_id: "test-worker".to_string(),
        idle_sleep: StdDuration::from_millis(10),
        sweep_cutoff: Duration::hours(1),
        classify_max_tweets: 1000,
        classify_max_batches: 100,
        chat_model: "mock".to_string(),
        embedding_model: "mock-embed-v1".to_string(),
        embedding_dimensions: 16,
        fetch_cron_schedule: "0 */30 * * * *".to_string(),
        classify_cron_schedule: "0 */10 * * * *".to_string(),
        report_cron_schedule: "0 0 9 * * *".to_string(),
        pipeline: PipelineConfig {
            fetch_batch_size: 50,
            fetch_cooldown: Duration::hours(12),
            classify_min_tweets: 0,
            classify_tag_min_tweets: 0,
            classify_candidate_cap: 1000,
            embedding_model: "mock-embed-v1".to_string(),
            embedding_dimensions: 16,
            routing_window_days: 30,
            llm_chunk_size: 10,
            llm_max_attempts: 3,
            llm_retry_backoff: Duration::seconds(1),
            classify_concurrency: 2,
            ai_lock_ttl: Duration::minutes(10),
            allowed_tags: vec!["policy".to_string(), "other".to_string()],
            tag_aliases: HashMap::new(),
            content_risk_patterns: Vec::new(),
            report_cluster_threshold: 0.86,
            report_cross_tag_bump: 0.05,
            mid_triage_chunk_size: 40,
            mid_triage_max_keep_per_chunk: 8,
            report_mid_triage_concurrency: 2,
            notify_items_per_message: 5,
        },
    }
}

async fn connect() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    pool
}

fn mock_worker(pg: Arc<PgStore>) -> Worker {
    let collaborators = Collaborators {
        fetcher: Arc::new(MockFetcher::new().with_posts(
            "feed-account",
            vec![FetchedPost {
                external_id: "ext-1".to_string(),
                created_at: Utc::now(),
                text: "breaking: new policy announced today".to_string(),
                lang: Some("en".to_string()),
                author_handle: "feed-account".to_string(),
                raw_metadata: serde_json::json!({}),
            }],
        )),
        embedder: Arc::new(MockEmbedder::new(16)),
        classifier: Arc::new(MockLlmClassifier::new()),
        notifier: Arc::new(MockNotifier::new()),
    };
    Worker::new(pg, collaborators, test_config())
}

#[tokio::test]
#[ignore]
async fn fetch_subscriptions_ingests_due_posts() {
    let pool = connect().await;
    let pg = Arc::new(PgStore::new(pool));

    let sub = Subscription::new("feed-account", vec!["policy".to_string()]);
    pg.upsert_subscription(&sub).await.unwrap();

    let worker = mock_worker(pg.clone());
    worker.enqueue(JobPayload::FetchSubscriptions { subscription_ids: None }).await;

    assert!(worker.tick().await, "expected the fetch job to be claimed and run");
    assert!(!worker.tick().await, "queue should be empty after the single enqueued job");
}

#[tokio::test]
#[ignore]
async fn idle_queue_returns_false_without_claiming_anything() {
    let pool = connect().await;
    let pg = Arc::new(PgStore::new(pool));
    let worker = mock_worker(pg);
    assert!(!worker.tick().await);
}
