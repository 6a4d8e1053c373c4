//! `report-profile` job handler: window -> filter -> optional mid-tier AI
//! re-triage -> optional clustering -> render -> persist (spec.md section
//! 4.6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clustering::{cluster, Cluster, ClusterCandidate};
use crate::error::Result;
use crate::report::{apply_profile_filters, build_author_outline, build_clustered_outline, build_tag_outline, is_high_tier, is_mid_tier, render_markdown};
use crate::routing::{normalize_embedding_text, text_hash};
use crate::traits::store::InsightWithPost;
use crate::traits::{EmbeddingProvider, LlmClassifier, Store};
use crate::types::{GroupBy, PostEmbedding, Report, ReportProfile};

use super::PipelineConfig;

/// Embeddings needed for clustering are refreshed in batches this large,
/// matching the embedding batch size used by the classify stage
/// (spec.md section 6).
const EMBED_BATCH_SIZE: usize = 10;

const DEFAULT_AI_FILTER_PROMPT: &str =
    "Decide which of these mid-importance items are worth surfacing in a digest; keep only the genuinely notable ones.";

#[derive(Debug, Clone, Default)]
pub struct ReportOutcome {
    /// `true` if a report for this `(profile_id, period_end)` already
    /// existed and nothing was generated (spec.md section 4.6 preamble).
    pub skipped_existing: bool,
    pub total_candidates: usize,
    pub kept: usize,
    /// `(kept, total)` across all mid-tier chunks, if AI re-triage ran.
    pub mid_triage: Option<(usize, usize)>,
    pub clusters: usize,
    pub report_id: Option<Uuid>,
}

/// Run one `report-profile` job. `embedder`/`classifier` are optional:
/// their absence degrades `groupBy=cluster` to tag grouping and the
/// AI mid-tier filter to "keep everything", respectively (spec.md
/// section 4.6 failure semantics), rather than failing the job.
pub async fn report_profile(
    store: &Arc<dyn Store>,
    embedder: Option<&dyn EmbeddingProvider>,
    classifier: Option<&dyn LlmClassifier>,
    profile: &ReportProfile,
    window_end: DateTime<Utc>,
    config: &PipelineConfig,
) -> Result<ReportOutcome> {
    let period_end = window_end;
    let period_start = period_end - Duration::hours(profile.window_hours);

    if store.find_report(profile.id, period_end).await?.is_some() {
        info!(profile = %profile.name, period_end = %period_end, "report already exists for this period, skipping");
        return Ok(ReportOutcome { skipped_existing: true, ..Default::default() });
    }

    let candidates = store.list_insights_in_window(period_start, period_end).await?;
    let filtered = apply_profile_filters(candidates, profile);

    let mut outcome = ReportOutcome { total_candidates: filtered.len(), ..Default::default() };

    let mut survivors: Vec<InsightWithPost> = Vec::new();
    let mut mid_tier: Vec<InsightWithPost> = Vec::new();
    for item in filtered {
        let importance = item.insight.importance;
        if is_high_tier(importance) {
            survivors.push(item);
        } else if profile.ai_filter_enabled && is_mid_tier(importance) {
            mid_tier.push(item);
        } else {
            survivors.push(item);
        }
    }

    if !mid_tier.is_empty() {
        let mid_total = mid_tier.len();
        let kept = match classifier {
            Some(classifier) => ai_filter_mid_tier(classifier, &mid_tier, profile, config).await,
            None => {
                warn!(profile = %profile.name, "ai filter enabled but no LLM judge configured, keeping full mid-tier pool");
                mid_tier
            }
        };
        outcome.mid_triage = Some((kept.len(), mid_total));
        survivors.extend(kept);
    }
    outcome.kept = survivors.len();

    let outline = match profile.group_by {
        GroupBy::Tag => build_tag_outline(&survivors),
        GroupBy::Author => build_author_outline(&survivors),
        GroupBy::Cluster => match embedder {
            Some(embedder) => {
                let (clusters, lookup) = cluster_survivors(store, embedder, &survivors, config).await?;
                outcome.clusters = clusters.len();
                build_clustered_outline(&clusters, &lookup)
            }
            None => {
                warn!(profile = %profile.name, "groupBy=cluster but no embedding provider configured, degrading to tag grouping");
                build_tag_outline(&survivors)
            }
        },
    };

    let (headline, content) = render_markdown(
        &profile.name,
        period_start,
        period_end,
        &outline,
        outcome.kept,
        outcome.mid_triage,
    );

    let report = Report {
        id: Uuid::new_v4(),
        profile_id: Some(profile.id),
        period_start,
        period_end,
        headline,
        content,
        outline,
        delivered_at: None,
        created_at: Utc::now(),
    };
    store.insert_report(&report).await?;
    outcome.report_id = Some(report.id);

    info!(
        profile = %profile.name,
        candidates = outcome.total_candidates,
        kept = outcome.kept,
        clusters = outcome.clusters,
        "report-profile complete"
    );
    Ok(outcome)
}

/// Run the mid-tier LLM judge over `mid_tier` in `config.mid_triage_chunk_size`
/// chunks, up to `config.report_mid_triage_concurrency` chunks judged at once
/// (spec.md section 5, `REPORT_MID_TRIAGE_CONCURRENCY`), keeping at most
/// `profile.ai_filter_max_keep_per_chunk` items per chunk. A failed chunk
/// keeps everything in it rather than dropping silently (spec.md section
/// 4.6 step 3).
async fn ai_filter_mid_tier(
    classifier: &dyn LlmClassifier,
    mid_tier: &[InsightWithPost],
    profile: &ReportProfile,
    config: &PipelineConfig,
) -> Vec<InsightWithPost> {
    let prompt = profile.ai_filter_prompt.as_deref().unwrap_or(DEFAULT_AI_FILTER_PROMPT);
    let chunk_size = config.mid_triage_chunk_size.max(1);
    let concurrency = config.report_mid_triage_concurrency.max(1);

    let chunk_results: Vec<Vec<InsightWithPost>> = stream::iter(mid_tier.chunks(chunk_size))
        .map(|chunk| judge_one_chunk(classifier, chunk, prompt, profile.ai_filter_max_keep_per_chunk))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    chunk_results.into_iter().flatten().collect()
}

async fn judge_one_chunk(
    classifier: &dyn LlmClassifier,
    chunk: &[InsightWithPost],
    prompt: &str,
    max_keep: usize,
) -> Vec<InsightWithPost> {
    let items: Vec<(String, String)> = chunk
        .iter()
        .map(|c| {
            let text = c.insight.summary.clone().unwrap_or_else(|| c.post.text.clone());
            (c.post.external_id.clone(), text)
        })
        .collect();

    match classifier.judge_keep(prompt, &items).await {
        Ok(keep_ids) => {
            let keep_set: HashSet<&str> = keep_ids.iter().map(|s| s.as_str()).collect();
            let mut chunk_kept: Vec<InsightWithPost> = chunk
                .iter()
                .filter(|c| keep_set.contains(c.post.external_id.as_str()))
                .cloned()
                .collect();
            chunk_kept.truncate(max_keep);
            chunk_kept
        }
        Err(e) => {
            warn!(error = %e, "mid-tier judge call failed, keeping full chunk");
            chunk.to_vec()
        }
    }
}

/// Ensure every survivor has a fresh embedding (reusing persisted ones
/// where still valid, same as the classify stage's `resolve_embeddings`)
/// and run greedy clustering over the result.
async fn cluster_survivors(
    store: &Arc<dyn Store>,
    embedder: &dyn EmbeddingProvider,
    survivors: &[InsightWithPost],
    config: &PipelineConfig,
) -> Result<(Vec<Cluster>, HashMap<Uuid, InsightWithPost>)> {
    let mut lookup = HashMap::with_capacity(survivors.len());
    let mut vectors: HashMap<Uuid, Vec<f32>> = HashMap::new();
    let mut need_embedding: Vec<(Uuid, String)> = Vec::new();

    for item in survivors {
        lookup.insert(item.post.id, item.clone());
        let normalized = normalize_embedding_text(&item.post.text, item.post.lang.as_deref());
        let hash = text_hash(&normalized);
        let reuse = match store.get_embedding(item.post.id).await? {
            Some(embedding)
                if !embedding.is_stale(&config.embedding_model, config.embedding_dimensions, &hash) =>
            {
                Some(embedding.vector)
            }
            _ => None,
        };
        match reuse {
            Some(v) => {
                vectors.insert(item.post.id, v);
            }
            None => need_embedding.push((item.post.id, normalized)),
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

    let candidates: Vec<ClusterCandidate> = survivors
        .iter()
        .filter_map(|item| {
            vectors.get(&item.post.id).map(|v| ClusterCandidate {
                id: item.post.id,
                vector: v.clone(),
                importance: item.insight.importance.unwrap_or(1),
                tags: item.insight.tags.clone(),
                posted_at: item.post.source_timestamp,
            })
        })
        .collect();

    let clusters = cluster(candidates, config.report_cluster_threshold, config.report_cross_tag_bump);
    Ok((clusters, lookup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, MockEmbedder, MockLlmClassifier};
    use crate::traits::{InsightStore, PostStore};
    use crate::types::post::FetchedPost;
    use crate::types::{Insight, Post, ReportProfile, Verdict};
    use std::collections::HashMap as Map;

    fn config() -> PipelineConfig {
        PipelineConfig {
            fetch_batch_size: 10,
            fetch_cooldown: Duration::hours(12),
            classify_min_tweets: 3,
            classify_tag_min_tweets: 2,
            classify_candidate_cap: 1000,
            embedding_model: "mock-embed-v1".to_string(),
            embedding_dimensions: 16,
            routing_window_days: 30,
            llm_chunk_size: 10,
            llm_max_attempts: 3,
            llm_retry_backoff: Duration::seconds(2),
            classify_concurrency: 4,
            ai_lock_ttl: Duration::minutes(60),
            allowed_tags: vec!["policy".to_string(), "other".to_string()],
            tag_aliases: Map::new(),
            content_risk_patterns: Vec::new(),
            report_cluster_threshold: 0.5,
            report_cross_tag_bump: 0.05,
            mid_triage_chunk_size: 2,
            mid_triage_max_keep_per_chunk: 1,
            report_mid_triage_concurrency: 4,
            notify_items_per_message: 5,
        }
    }

    async fn seed_insight(
        store: &Arc<dyn Store>,
        external_id: &str,
        importance: u8,
        tag: &str,
        text: &str,
    ) -> Post {
        let post = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: external_id.to_string(),
                created_at: Utc::now(),
                text: text.to_string(),
                lang: Some("en".to_string()),
                author_handle: "acct".to_string(),
                raw_metadata: serde_json::json!({}),
            },
        );
        let post = store.upsert_post(&post).await.unwrap();
        let insight = Insight::new(
            post.id,
            external_id,
            Verdict::Watch,
            Some("summary".to_string()),
            Some(importance),
            vec![tag.to_string()],
            None,
        );
        store.upsert_insight(&insight).await.unwrap();
        post
    }

    #[tokio::test]
    async fn high_tier_items_are_kept_without_ai_filter() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        seed_insight(&store, "e1", 5, "policy", "first notable post").await;
        let profile = ReportProfile::new("digest", 24);

        let outcome = report_profile(&store, None, None, &profile, Utc::now(), &config()).await.unwrap();
        assert!(!outcome.skipped_existing);
        assert_eq!(outcome.total_candidates, 1);
        assert_eq!(outcome.kept, 1);
        assert!(outcome.mid_triage.is_none());
    }

    #[tokio::test]
    async fn second_run_for_same_period_is_skipped() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        seed_insight(&store, "e1", 5, "policy", "first notable post").await;
        let profile = ReportProfile::new("digest", 24);
        let window_end = Utc::now();

        let first = report_profile(&store, None, None, &profile, window_end, &config()).await.unwrap();
        assert!(!first.skipped_existing);

        let second = report_profile(&store, None, None, &profile, window_end, &config()).await.unwrap();
        assert!(second.skipped_existing);
    }

    #[tokio::test]
    async fn mid_tier_ai_filter_runs_across_concurrent_chunks() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        for i in 0..4 {
            seed_insight(&store, &format!("e{i}"), 2, "policy", "mid tier post").await;
        }
        let mut profile = ReportProfile::new("digest", 24);
        profile.ai_filter_enabled = true;
        profile.ai_filter_max_keep_per_chunk = 1;
        let classifier = MockLlmClassifier::new();

        let outcome =
            report_profile(&store, None, Some(&classifier), &profile, Utc::now(), &config()).await.unwrap();
        assert_eq!(outcome.total_candidates, 4);
        let (kept, total) = outcome.mid_triage.unwrap();
        assert_eq!(total, 4);
        // Two chunks of size 2 (mid_triage_chunk_size), capped to 1 kept each.
        assert_eq!(kept, 2);
        assert_eq!(outcome.kept, 2);
    }

    #[tokio::test]
    async fn cluster_group_by_without_embedder_degrades_to_tag_grouping() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        seed_insight(&store, "e1", 5, "policy", "first notable post").await;
        let mut profile = ReportProfile::new("digest", 24);
        profile.group_by = GroupBy::Cluster;

        let outcome = report_profile(&store, None, None, &profile, Utc::now(), &config()).await.unwrap();
        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.clusters, 0);
    }

    #[tokio::test]
    async fn cluster_group_by_with_embedder_produces_clusters() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        seed_insight(&store, "e1", 5, "policy", "identical post text").await;
        seed_insight(&store, "e2", 4, "policy", "identical post text").await;
        let mut profile = ReportProfile::new("digest", 24);
        profile.group_by = GroupBy::Cluster;
        let embedder = MockEmbedder::new(16);

        let outcome =
            report_profile(&store, Some(&embedder), None, &profile, Utc::now(), &config()).await.unwrap();
        assert_eq!(outcome.kept, 2);
        assert!(outcome.clusters >= 1);
    }
}
