//! RoutingCache rebuild (spec.md section 4.4.2): pulls historical
//! high-importance samples per tag plus a negative bucket, and derives
//! centroids, intra-cluster score statistics, and adaptive thresholds
//! from them.

use std::sync::Arc;

use chrono::{Duration, Utc};
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::Result;
use crate::routing::thresholds::{adapt_thresholds, score_stats};
use crate::traits::{PostEmbeddingStore, RoutingCacheStore, Store};
use crate::types::routing_cache::normalize;
use crate::types::{RoutingCache, TagSamples, TagThresholds};

/// Importance floor for the primary (high-confidence) sample pool
/// (spec.md section 4.4.2: "importance >= HIGH=4").
pub const HIGH_IMPORTANCE: u8 = 4;

/// Importance floor used to supplement a tag's pool when the primary
/// pool falls short of `PRIMARY_MIN`.
pub const SUPPLEMENT_IMPORTANCE: u8 = 3;

/// Minimum sample count a tag's pool should reach if the history
/// supports it (spec.md section 4.4.2: "PRIMARY_MIN=100").
pub const PRIMARY_MIN: usize = 100;

/// Upper bound on stored samples per tag (and for the negative bucket),
/// the "up to K" from spec.md section 4.4.2. Kept generous relative to
/// `PRIMARY_MIN` so centroids stay representative as a tag's history grows.
pub const SAMPLE_CAP: i64 = 200;

#[derive(Debug, Clone)]
pub struct CacheBuildConfig {
    pub model: String,
    pub dimensions: usize,
    pub window_days: u32,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Rebuild the singleton `RoutingCache` from historical insights and
/// persist it. Tags with no usable samples (no embedding, or all
/// candidates failed to normalize) are simply absent from `per_tag`;
/// they fall back to `TagThresholds::default()` at routing time via
/// `RoutingCache::thresholds_for`.
pub async fn rebuild_routing_cache(store: &Arc<dyn Store>, config: &CacheBuildConfig) -> Result<RoutingCache> {
    let now = Utc::now();
    let since = now - Duration::days(config.window_days as i64);

    let tags = store.distinct_recent_tags(since).await?;
    let mut per_tag = IndexMap::new();
    let mut thresholds = IndexMap::new();

    for tag in tags {
        let mut samples = store
            .list_routing_samples(&tag, since, HIGH_IMPORTANCE, SAMPLE_CAP)
            .await?;
        if samples.len() < PRIMARY_MIN {
            samples = store
                .list_routing_samples(&tag, since, SUPPLEMENT_IMPORTANCE, SAMPLE_CAP)
                .await?;
        }

        let mut positive = Vec::with_capacity(samples.len());
        for sample in &samples {
            match store.get_embedding(sample.post.id).await? {
                Some(embedding) if embedding.dimensions == config.dimensions => {
                    if let Some(normalized) = normalize(&embedding.vector) {
                        positive.push(normalized);
                    }
                }
                _ => warn!(tag, post_id = %sample.post.id, "skipping sample with missing or mismatched embedding"),
            }
        }

        if positive.is_empty() {
            continue;
        }

        let sample_count = positive.len();
        let tag_thresholds = derive_tag_thresholds(&positive);
        per_tag.insert(tag.clone(), TagSamples { positive, sample_count });
        thresholds.insert(tag, tag_thresholds);
    }

    let negative_raw = store.list_negative_samples(since, SAMPLE_CAP).await?;
    let mut negative_samples = Vec::with_capacity(negative_raw.len());
    for sample in &negative_raw {
        if let Some(embedding) = store.get_embedding(sample.post.id).await? {
            if embedding.dimensions == config.dimensions {
                if let Some(normalized) = normalize(&embedding.vector) {
                    negative_samples.push(normalized);
                }
            }
        }
    }

    let cache = RoutingCache {
        dimensions: config.dimensions,
        model: config.model.clone(),
        window_days: config.window_days,
        per_tag,
        negative_samples,
        thresholds,
        updated_at: now,
    };

    store.save_routing_cache(&cache).await?;
    info!(
        tags = cache.per_tag.len(),
        negative_samples = cache.negative_samples.len(),
        "rebuilt routing cache"
    );
    Ok(cache)
}

/// Centroid of `positive`, then adaptive thresholds derived from each
/// sample's cosine similarity to that centroid.
fn derive_tag_thresholds(positive: &[Vec<f32>]) -> TagThresholds {
    let defaults = TagThresholds::default();
    let dims = positive[0].len();
    let mut sum = vec![0.0f32; dims];
    for v in positive {
        for (i, x) in v.iter().enumerate() {
            sum[i] += x;
        }
    }
    for x in sum.iter_mut() {
        *x /= positive.len() as f32;
    }
    let Some(centroid) = normalize(&sum) else {
        return defaults;
    };

    let scores: Vec<f32> = positive.iter().map(|v| dot(v, &centroid)).collect();
    adapt_thresholds(defaults, score_stats(&scores), positive.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use crate::traits::{InsightStore, PostEmbeddingStore, PostStore};
    use crate::types::post::FetchedPost;
    use crate::types::{Insight, Post, PostEmbedding, Verdict};
    use uuid::Uuid;

    async fn seed_post(store: &Arc<dyn Store>, importance: u8, verdict: Verdict, tag: &str, vector: Vec<f32>) {
        let external_id = Uuid::new_v4().to_string();
        let post = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: external_id.clone(),
                created_at: Utc::now(),
                text: "x".to_string(),
                lang: None,
                author_handle: "a".to_string(),
                raw_metadata: serde_json::json!({}),
            },
        );
        let post = store.upsert_post(&post).await.unwrap();
        store
            .upsert_embedding(&PostEmbedding::new(post.id, vector, "m1", "h1"))
            .await
            .unwrap();
        let insight = Insight::new(
            post.id,
            &external_id,
            verdict,
            Some("s".to_string()),
            Some(importance),
            vec![tag.to_string()],
            None,
        );
        store.upsert_insight(&insight).await.unwrap();
    }

    #[tokio::test]
    async fn rebuild_populates_tag_from_high_importance_samples() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        for _ in 0..5 {
            seed_post(&store, 4, Verdict::Watch, "policy", vec![1.0, 0.0, 0.0]).await;
        }

        let config = CacheBuildConfig { model: "m1".to_string(), dimensions: 3, window_days: 30 };
        let cache = rebuild_routing_cache(&store, &config).await.unwrap();
        assert!(cache.per_tag.contains_key("policy"));
        assert_eq!(cache.per_tag["policy"].sample_count, 5);
    }

    #[tokio::test]
    async fn negative_bucket_collects_ignored_posts() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        seed_post(&store, 1, Verdict::Ignore, "other", vec![0.0, 1.0, 0.0]).await;

        let config = CacheBuildConfig { model: "m1".to_string(), dimensions: 3, window_days: 30 };
        let cache = rebuild_routing_cache(&store, &config).await.unwrap();
        assert_eq!(cache.negative_samples.len(), 1);
    }

    #[tokio::test]
    async fn supplements_with_lower_importance_when_under_primary_min() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        for _ in 0..3 {
            seed_post(&store, 3, Verdict::Watch, "markets", vec![0.0, 0.0, 1.0]).await;
        }

        let config = CacheBuildConfig { model: "m1".to_string(), dimensions: 3, window_days: 30 };
        let cache = rebuild_routing_cache(&store, &config).await.unwrap();
        assert_eq!(cache.per_tag["markets"].sample_count, 3);
    }
}
