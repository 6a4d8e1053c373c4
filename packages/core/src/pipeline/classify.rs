//! `classify-tweets` job handler: rule filter -> embed -> route -> persist
//! -> dispatch (spec.md sections 4.4 and 4.2).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::queue::{EnqueueOptions, JobQueue};
use crate::routing::{
    self, dispatch::DISPATCH_CANDIDATE_CAP, normalize_embedding_text, plan_batches_for_tag, route_embedding,
    rule_filter, text_hash, RoutingDecision, RuleDecision, ThresholdOverrides,
};
use crate::traits::{EmbeddingProvider, InsightStore, PostEmbeddingStore, PostStore, RoutingCacheStore, Store};
use crate::types::{Insight, JobPayload, Post, PostEmbedding, RoutingCache};

use super::PipelineConfig;

/// Posts are written back in chunks this large (spec.md section 4.1).
const ROUTING_WRITE_CHUNK: usize = 100;

/// Embeddings are requested in batches this large (spec.md section 6).
const EMBED_BATCH_SIZE: usize = 10;

/// Ceiling on classify-tweets-llm jobs enqueued in one sweep so a huge
/// backlog can't flood the queue in a single run; the remainder is picked
/// up on the next scheduled sweep.
const MAX_DISPATCH_BATCHES_PER_RUN: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ClassifyOutcome {
    pub pending: usize,
    pub rule_dropped: usize,
    pub ignored: usize,
    pub auto_high: usize,
    pub routed: usize,
    pub dispatched_jobs: usize,
}

/// Run one classify-tweets sweep over pending posts.
pub async fn classify_tweets(
    store: &Arc<dyn Store>,
    embedder: &dyn EmbeddingProvider,
    queue: &JobQueue,
    config: &PipelineConfig,
) -> Result<ClassifyOutcome> {
    let pending = store.list_pending_posts(config.classify_candidate_cap).await?;
    let mut outcome = ClassifyOutcome { pending: pending.len(), ..Default::default() };

    if pending.len() < config.classify_min_tweets {
        info!(
            pending = pending.len(),
            min = config.classify_min_tweets,
            "classify-tweets deferred: below minimum"
        );
        return Ok(outcome);
    }

    let now = Utc::now();
    let mut survivors = Vec::new();
    let mut to_persist = Vec::new();
    let mut to_upsert_insights = Vec::new();

    for mut post in pending {
        match rule_filter(&post.text, post.lang.as_deref()) {
            RuleDecision::Drop(reason) => {
                post.mark_ignored(reason.as_str(), now);
                to_upsert_insights.push(Insight::synthesize_ignored(post.id, post.external_id.clone()));
                to_persist.push(post);
                outcome.rule_dropped += 1;
            }
            RuleDecision::Keep => survivors.push(post),
        }
    }

    let vectors = resolve_embeddings(store, embedder, config, &survivors).await?;
    let cache = load_or_rebuild_cache(store, config).await?;
    let overrides = ThresholdOverrides::new();
    let mut touched_tags: HashSet<String> = HashSet::new();

    for mut post in survivors {
        let Some(vector) = vectors.get(&post.id) else {
            warn!(post_id = %post.id, "no embedding produced, deferring to next sweep");
            continue;
        };
        match route_embedding(&cache, vector, &overrides) {
            RoutingDecision::Ignore { reason } => {
                post.mark_ignored(reason, now);
                to_upsert_insights.push(Insight::synthesize_ignored(post.id, post.external_id.clone()));
                outcome.ignored += 1;
            }
            RoutingDecision::AutoHigh { tag, score, margin, importance } => {
                post.mark_auto_high(tag.as_str(), score, margin, "embed-high", now);
                to_upsert_insights.push(Insight::synthesize_auto_high(
                    post.id,
                    post.external_id.clone(),
                    tag,
                    importance,
                ));
                outcome.auto_high += 1;
            }
            RoutingDecision::Analyze { tag, score, margin, reason } => {
                post.mark_routed(tag.as_str(), score, margin, reason, now);
                touched_tags.insert(tag);
                outcome.routed += 1;
            }
        }
        to_persist.push(post);
    }

    for chunk in to_persist.chunks(ROUTING_WRITE_CHUNK) {
        store.bulk_update_routing(chunk).await?;
    }
    for insight in &to_upsert_insights {
        store.upsert_insight(insight).await?;
    }

    outcome.dispatched_jobs = dispatch_routed_tags(store, queue, config, touched_tags).await?;

    info!(
        pending = outcome.pending,
        rule_dropped = outcome.rule_dropped,
        ignored = outcome.ignored,
        auto_high = outcome.auto_high,
        routed = outcome.routed,
        dispatched = outcome.dispatched_jobs,
        "classify-tweets complete"
    );
    Ok(outcome)
}

/// Reuse a fresh persisted embedding where one exists; otherwise embed
/// the rest in batches of `EMBED_BATCH_SIZE` and persist the result.
async fn resolve_embeddings(
    store: &Arc<dyn Store>,
    embedder: &dyn EmbeddingProvider,
    config: &PipelineConfig,
    survivors: &[Post],
) -> Result<HashMap<Uuid, Vec<f32>>> {
    let mut vectors = HashMap::new();
    let mut need_embedding: Vec<(Uuid, String)> = Vec::new();

    for post in survivors {
        let normalized = normalize_embedding_text(&post.text, post.lang.as_deref());
        let hash = text_hash(&normalized);
        let reuse = match store.get_embedding(post.id).await? {
            Some(embedding)
                if !embedding.is_stale(&config.embedding_model, config.embedding_dimensions, &hash) =>
            {
                Some(embedding.vector)
            }
            _ => None,
        };
        match reuse {
            Some(vector) => {
                vectors.insert(post.id, vector);
            }
            None => need_embedding.push((post.id, normalized)),
        }
    }

    for chunk in need_embedding.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
        let embedded = embedder.embed_batch(&texts).await?;
        for ((post_id, normalized), vector) in chunk.iter().zip(embedded.into_iter()) {
            let hash = text_hash(normalized);
            let embedding = PostEmbedding::new(*post_id, vector.clone(), embedder.model(), hash);
            store.upsert_embedding(&embedding).await?;
            vectors.insert(*post_id, vector);
        }
    }

    Ok(vectors)
}

async fn load_or_rebuild_cache(store: &Arc<dyn Store>, config: &PipelineConfig) -> Result<RoutingCache> {
    let build_config = config.cache_build_config();
    match store.load_routing_cache().await? {
        Some(cache)
            if !cache.is_stale_for(&config.embedding_model, config.embedding_dimensions, config.routing_window_days) =>
        {
            Ok(cache)
        }
        _ => routing::rebuild_routing_cache(store, &build_config).await,
    }
}

async fn dispatch_routed_tags(
    store: &Arc<dyn Store>,
    queue: &JobQueue,
    config: &PipelineConfig,
    tags: HashSet<String>,
) -> Result<usize> {
    let mut dispatched = 0usize;
    let mut tags: Vec<String> = tags.into_iter().collect();
    tags.sort();

    'tags: for tag in tags {
        let routed = store.list_routed_by_tag(&tag, DISPATCH_CANDIDATE_CAP as i64).await?;
        let Some(batches) = plan_batches_for_tag(&tag, &routed, config.classify_tag_min_tweets) else {
            continue;
        };
        for batch in batches {
            if dispatched >= MAX_DISPATCH_BATCHES_PER_RUN {
                warn!(tag, "dispatch batch cap reached this sweep, remainder deferred");
                break 'tags;
            }
            let claimed = store.claim_for_llm_dispatch(&batch.post_ids, Utc::now()).await?;
            if claimed.is_empty() {
                continue;
            }
            queue
                .enqueue(
                    JobPayload::ClassifyTweetsLlm { post_ids: claimed, tag: batch.tag.clone() },
                    EnqueueOptions::default(),
                )
                .await?;
            dispatched += 1;
        }
    }
    Ok(dispatched)
}
