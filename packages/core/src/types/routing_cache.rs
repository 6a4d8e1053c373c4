//! Singleton routing cache: per-tag centroids, sample pools, and the
//! adaptive thresholds derived from them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fixed key for the singleton row (spec.md section 3: "singleton row
/// keyed `routing-tag-cache`").
pub const ROUTING_CACHE_KEY: &str = "routing-tag-cache";

/// Adaptive thresholds for one tag, derived from its sample statistics.
/// Defaults per spec.md section 4.4.2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagThresholds {
    pub low_sim: f32,
    pub high_sim: f32,
    pub high_strict: f32,
    pub high_margin: f32,
    pub neg_gap_low: f32,
    pub neg_gap_high: f32,
}

impl Default for TagThresholds {
    fn default() -> Self {
        Self {
            low_sim: 0.72,
            high_sim: 0.86,
            high_strict: 0.90,
            high_margin: 0.04,
            neg_gap_low: 0.05,
            neg_gap_high: 0.08,
        }
    }
}

/// Positive and negative embedding sample pools for one tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSamples {
    /// Up to K normalized embedding vectors of historically high-importance posts.
    pub positive: Vec<Vec<f32>>,
    pub sample_count: usize,
}

/// Singleton row holding everything the embedding router needs to score
/// and route incoming posts without re-deriving it per post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingCache {
    pub dimensions: usize,
    pub model: String,
    pub window_days: u32,
    pub per_tag: IndexMap<String, TagSamples>,
    pub negative_samples: Vec<Vec<f32>>,
    pub thresholds: IndexMap<String, TagThresholds>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingCache {
    pub fn empty(model: impl Into<String>, dimensions: usize, window_days: u32) -> Self {
        Self {
            dimensions,
            model: model.into(),
            window_days,
            per_tag: IndexMap::new(),
            negative_samples: Vec::new(),
            thresholds: IndexMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Cache is rebuilt when absent, model/dimension changed, or window
    /// / sample parameters changed (spec.md section 4.4.2).
    pub fn is_stale_for(&self, model: &str, dimensions: usize, window_days: u32) -> bool {
        self.model != model || self.dimensions != dimensions || self.window_days != window_days
    }

    pub fn thresholds_for(&self, tag: &str) -> TagThresholds {
        self.thresholds.get(tag).copied().unwrap_or_default()
    }

    /// Normalized mean of a tag's positive samples, or `None` if it has none.
    pub fn centroid_for(&self, tag: &str) -> Option<Vec<f32>> {
        self.per_tag.get(tag).and_then(|s| mean_normalized(&s.positive))
    }

    pub fn negative_centroid(&self) -> Option<Vec<f32>> {
        mean_normalized(&self.negative_samples)
    }
}

/// Normalize a vector to unit length; returns `None` for a zero vector.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        None
    } else {
        Some(v.iter().map(|x| x / norm).collect())
    }
}

fn mean_normalized(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    if vectors.is_empty() {
        return None;
    }
    let dims = vectors[0].len();
    let mut sum = vec![0.0f32; dims];
    for v in vectors {
        for (i, x) in v.iter().enumerate() {
            sum[i] += x;
        }
    }
    let n = vectors.len() as f32;
    for x in sum.iter_mut() {
        *x /= n;
    }
    normalize(&sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_when_model_or_dims_or_window_changes() {
        let cache = RoutingCache::empty("m1", 1536, 30);
        assert!(cache.is_stale_for("m2", 1536, 30));
        assert!(cache.is_stale_for("m1", 768, 30));
        assert!(cache.is_stale_for("m1", 1536, 14));
        assert!(!cache.is_stale_for("m1", 1536, 30));
    }

    #[test]
    fn centroid_is_normalized_mean() {
        let mut cache = RoutingCache::empty("m1", 2, 30);
        cache.per_tag.insert(
            "policy".into(),
            TagSamples {
                positive: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                sample_count: 2,
            },
        );
        let centroid = cache.centroid_for("policy").unwrap();
        let norm: f32 = centroid.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn missing_tag_has_no_centroid() {
        let cache = RoutingCache::empty("m1", 2, 30);
        assert!(cache.centroid_for("policy").is_none());
    }
}
