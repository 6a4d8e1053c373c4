//! `classify-tweets-llm` job handler: takes a claimed batch of routed
//! posts through the LLM classifier under the `classify` mutual-exclusion
//! lock (spec.md sections 4.3 and 4.5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, TriageError};
use crate::llm::{coerce_item, RawLlmItem};
use crate::lock::LockManager;
use crate::traits::external::{LlmBatchOutcome, LlmClassification, LlmClassifier};
use crate::traits::{InsightStore, PostStore, Store};
use crate::types::{AbandonReason, Post, SystemLock};

use super::PipelineConfig;

/// Lock key guarding LLM dispatch, shared by every classify-tweets-llm job
/// so at most one batch is in flight against the model at a time.
const CLASSIFY_LOCK_KEY: &str = "classify";

#[derive(Debug, Clone, Default)]
pub struct ClassifyLlmOutcome {
    pub classified: usize,
    pub content_risk_abandoned: usize,
    pub max_retries_abandoned: usize,
}

/// Process one `classify-tweets-llm` batch: acquire the shared lock,
/// classify in chunks of `config.llm_chunk_size`, persist insights and
/// post state, then release the lock regardless of outcome.
pub async fn classify_tweets_llm(
    job_id: Uuid,
    store: &Arc<dyn Store>,
    classifier: &dyn LlmClassifier,
    locks: &LockManager,
    post_ids: &[Uuid],
    tag: &str,
    config: &PipelineConfig,
) -> Result<ClassifyLlmOutcome> {
    let holder = SystemLock::job_holder(job_id);
    let now = Utc::now();

    if !locks.acquire(CLASSIFY_LOCK_KEY, &holder, config.ai_lock_ttl, now).await? {
        return Err(TriageError::LockUnavailable {
            scope: CLASSIFY_LOCK_KEY.to_string(),
            holder,
        });
    }

    let result = classify_chunks(store, classifier, post_ids, tag, config).await;

    if let Err(e) = locks.release(CLASSIFY_LOCK_KEY, &holder).await {
        warn!(job_id = %job_id, error = %e, "failed to release classify lock");
    }

    result
}

/// Per-chunk tally, combined into the batch's [`ClassifyLlmOutcome`] after
/// every chunk has resolved.
#[derive(Debug, Clone, Default)]
struct ChunkOutcome {
    classified: usize,
    content_risk_abandoned: usize,
    max_retries_abandoned: usize,
}

/// Classify `posts.chunks(config.llm_chunk_size)` with up to
/// `config.classify_concurrency` chunks in flight against the classifier
/// at once (spec.md section 5, `CLASSIFY_CONCURRENCY`). Chunks are
/// independent: each resolves its own insights/post-state writes, so a
/// slow or content-risky chunk never blocks its siblings.
async fn classify_chunks(
    store: &Arc<dyn Store>,
    classifier: &dyn LlmClassifier,
    post_ids: &[Uuid],
    tag: &str,
    config: &PipelineConfig,
) -> Result<ClassifyLlmOutcome> {
    let posts = store.get_posts_by_ids(post_ids).await?;
    let now = Utc::now();
    let concurrency = config.classify_concurrency.max(1);

    let results: Vec<Result<ChunkOutcome>> = stream::iter(posts.chunks(config.llm_chunk_size).map(<[Post]>::to_vec))
        .map(|chunk| classify_one_chunk(store, classifier, chunk, tag, config, now))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut outcome = ClassifyLlmOutcome::default();
    for chunk_outcome in results {
        let chunk_outcome = chunk_outcome?;
        outcome.classified += chunk_outcome.classified;
        outcome.content_risk_abandoned += chunk_outcome.content_risk_abandoned;
        outcome.max_retries_abandoned += chunk_outcome.max_retries_abandoned;
    }
    Ok(outcome)
}

async fn classify_one_chunk(
    store: &Arc<dyn Store>,
    classifier: &dyn LlmClassifier,
    chunk: Vec<Post>,
    tag: &str,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<ChunkOutcome> {
    let mut outcome = ChunkOutcome::default();
    let pairs: Vec<(String, String)> =
        chunk.iter().map(|p| (p.external_id.clone(), p.text.clone())).collect();
    let batch_outcome = classifier.classify_batch(&pairs, Some(tag)).await?;

    match batch_outcome {
        LlmBatchOutcome::Abandoned(AbandonReason::ContentRisk, reason) => {
            warn!(tag, reason, "content risk detected, abandoning batch without retry");
            let mut abandoned = Vec::with_capacity(chunk.len());
            for mut post in chunk {
                post.abandon(AbandonReason::ContentRisk, now);
                abandoned.push(post);
            }
            store.bulk_update_routing(&abandoned).await?;
            outcome.content_risk_abandoned += abandoned.len();
        }
        LlmBatchOutcome::Abandoned(AbandonReason::MaxRetries, error) => {
            warn!(tag, error, "classify batch exhausted retries, abandoning without failing the job");
            let mut abandoned = Vec::with_capacity(chunk.len());
            for mut post in chunk {
                post.abandon(AbandonReason::MaxRetries, now);
                abandoned.push(post);
            }
            store.bulk_update_routing(&abandoned).await?;
            outcome.max_retries_abandoned += abandoned.len();
        }
        LlmBatchOutcome::Classified(items) => {
            let mut by_external: HashMap<String, LlmClassification> =
                items.into_iter().map(|i| (i.external_id.clone(), i)).collect();
            let mut completed = Vec::with_capacity(chunk.len());
            for mut post in chunk {
                let raw = by_external.remove(&post.external_id).map(to_raw_item);
                let insight = coerce_item(
                    post.id,
                    &post.external_id,
                    &post.text,
                    raw.as_ref(),
                    &config.allowed_tags,
                    &config.tag_aliases,
                );
                store.upsert_insight(&insight).await?;
                post.mark_completed(now);
                completed.push(post);
                outcome.classified += 1;
            }
            store.bulk_update_routing(&completed).await?;
        }
    }

    Ok(outcome)
}

fn to_raw_item(item: LlmClassification) -> RawLlmItem {
    RawLlmItem {
        tweet_id: item.external_id,
        verdict: Some(item.verdict),
        summary: item.summary,
        importance: item.importance,
        tags: item.tags,
        suggestion: item.suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, MockLlmClassifier};
    use crate::types::post::FetchedPost;
    use crate::types::{Post, RoutingStatus};
    use std::collections::HashMap as Map;

    fn config() -> PipelineConfig {
        PipelineConfig {
            fetch_batch_size: 10,
            fetch_cooldown: chrono::Duration::hours(12),
            classify_min_tweets: 10,
            classify_tag_min_tweets: 10,
            classify_candidate_cap: 1000,
            embedding_model: "m1".to_string(),
            embedding_dimensions: 16,
            routing_window_days: 30,
            llm_chunk_size: 10,
            llm_max_attempts: 3,
            llm_retry_backoff: chrono::Duration::seconds(2),
            classify_concurrency: 4,
            ai_lock_ttl: chrono::Duration::minutes(60),
            allowed_tags: vec!["policy".to_string(), "other".to_string()],
            tag_aliases: Map::new(),
            content_risk_patterns: Vec::new(),
            report_cluster_threshold: 0.9,
            report_cross_tag_bump: 0.05,
            mid_triage_chunk_size: 40,
            mid_triage_max_keep_per_chunk: 8,
            report_mid_triage_concurrency: 4,
            notify_items_per_message: 5,
        }
    }

    async fn seed_routed(store: &Arc<dyn Store>, external_id: &str) -> Uuid {
        let post = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: external_id.to_string(),
                created_at: Utc::now(),
                text: "some routed post text".to_string(),
                lang: Some("en".to_string()),
                author_handle: "acct".to_string(),
                raw_metadata: serde_json::json!({}),
            },
        );
        let mut post = store.upsert_post(&post).await.unwrap();
        post.mark_routed("policy", 0.8, 0.1, "embed-analyze", Utc::now());
        store.bulk_update_routing(&[post.clone()]).await.unwrap();
        post.id
    }

    #[tokio::test]
    async fn classified_batch_produces_insights_and_completes_posts() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let id = seed_routed(&store, "e1").await;
        let classifier = MockLlmClassifier::new();
        let locks = LockManager::new(store.clone());

        let outcome = classify_tweets_llm(Uuid::new_v4(), &store, &classifier, &locks, &[id], "policy", &config())
            .await
            .unwrap();
        assert_eq!(outcome.classified, 1);
        assert_eq!(outcome.content_risk_abandoned, 0);

        let reloaded = store.get_posts_by_ids(&[id]).await.unwrap();
        assert_eq!(reloaded[0].routing_status, RoutingStatus::Completed);
        assert!(store.get_insight("e1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn content_risk_abandons_without_insight_or_retry() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let id = seed_routed(&store, "e1").await;
        let classifier = MockLlmClassifier::new().with_content_risk();
        let locks = LockManager::new(store.clone());

        let outcome = classify_tweets_llm(Uuid::new_v4(), &store, &classifier, &locks, &[id], "policy", &config())
            .await
            .unwrap();
        assert_eq!(outcome.classified, 0);
        assert_eq!(outcome.content_risk_abandoned, 1);

        let reloaded = store.get_posts_by_ids(&[id]).await.unwrap();
        assert!(reloaded[0].is_abandoned());
        assert!(store.get_insight("e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn max_retries_exhausted_abandons_without_failing_the_job() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let id = seed_routed(&store, "e1").await;
        let classifier = MockLlmClassifier::new().with_max_retries_exhausted();
        let locks = LockManager::new(store.clone());

        let outcome = classify_tweets_llm(Uuid::new_v4(), &store, &classifier, &locks, &[id], "policy", &config())
            .await
            .unwrap();
        assert_eq!(outcome.classified, 0);
        assert_eq!(outcome.content_risk_abandoned, 0);
        assert_eq!(outcome.max_retries_abandoned, 1);

        let reloaded = store.get_posts_by_ids(&[id]).await.unwrap();
        assert!(reloaded[0].is_abandoned());
        assert!(store.get_insight("e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lock_held_by_another_holder_returns_lock_unavailable() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let id = seed_routed(&store, "e1").await;
        let classifier = MockLlmClassifier::new();
        let locks = LockManager::new(store.clone());
        assert!(locks
            .acquire(CLASSIFY_LOCK_KEY, "someone-else", chrono::Duration::minutes(30), Utc::now())
            .await
            .unwrap());

        let err = classify_tweets_llm(Uuid::new_v4(), &store, &classifier, &locks, &[id], "policy", &config())
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::LockUnavailable { .. }));
    }
}
