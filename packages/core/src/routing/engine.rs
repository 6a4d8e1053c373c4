//! Per-post routing decisions against a `RoutingCache` snapshot
//! (spec.md section 4.4.2).

use std::collections::HashMap;

use crate::types::{RoutingCache, TagThresholds};

/// Top-K samples considered when scoring a post against a tag
/// (spec.md section 4.4.2 step 2).
const TOP_K: usize = 5;

/// Per-tag threshold pin, read before computing adaptive thresholds
/// (spec.md section 9 "operators can pin thresholds per tag").
pub type ThresholdOverrides = HashMap<String, TagThresholds>;

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Mean of the top-K dot products between `query` and `samples`.
fn top_k_mean_score(query: &[f32], samples: &[Vec<f32>]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let mut scores: Vec<f32> = samples.iter().map(|s| cosine_similarity(query, s)).collect();
    scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    scores.truncate(TOP_K);
    Some(scores.iter().sum::<f32>() / scores.len() as f32)
}

pub const UNROUTED_TAG: &str = "__unrouted__";

/// Outcome of routing one post.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    Ignore {
        reason: &'static str,
    },
    AutoHigh {
        tag: String,
        score: f32,
        margin: f32,
        importance: u8,
    },
    Analyze {
        tag: String,
        score: f32,
        margin: f32,
        reason: &'static str,
    },
}

/// Route one post's embedding against the cache's per-tag sample pools,
/// applying the decision table in spec.md section 4.4.2 step 5.
///
/// `overrides` lets an operator pin a tag's thresholds instead of using
/// the cache-derived adaptive ones.
pub fn route_embedding(
    cache: &RoutingCache,
    embedding: &[f32],
    overrides: &ThresholdOverrides,
) -> RoutingDecision {
    let mut scored: Vec<(String, f32)> = cache
        .per_tag
        .iter()
        .filter_map(|(tag, samples)| {
            top_k_mean_score(embedding, &samples.positive).map(|score| (tag.clone(), score))
        })
        .collect();

    // Ties broken by tag name ascending for determinism.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let Some((best_tag, best_score)) = scored.first().cloned() else {
        return RoutingDecision::Analyze {
            tag: UNROUTED_TAG.to_string(),
            score: 0.0,
            margin: 0.0,
            reason: "embed-unrouted",
        };
    };
    let second_score = scored.get(1).map(|(_, s)| *s).unwrap_or(0.0);
    let margin = best_score - second_score;

    let thresholds = overrides
        .get(&best_tag)
        .copied()
        .unwrap_or_else(|| cache.thresholds_for(&best_tag));

    let neg_gap = cache
        .negative_centroid()
        .map(|neg| best_score - cosine_similarity(embedding, &neg));

    if best_score <= thresholds.low_sim {
        return RoutingDecision::Ignore { reason: "embed-low" };
    }
    if let Some(gap) = neg_gap {
        if gap < thresholds.neg_gap_low {
            return RoutingDecision::Ignore {
                reason: "embed-negative",
            };
        }
    }
    if best_score >= thresholds.high_sim
        && margin >= thresholds.high_margin
        && neg_gap.map(|gap| gap >= thresholds.neg_gap_high).unwrap_or(true)
    {
        let importance = if best_score >= thresholds.high_strict { 5 } else { 4 };
        return RoutingDecision::AutoHigh {
            tag: best_tag,
            score: best_score,
            margin,
            importance,
        };
    }

    RoutingDecision::Analyze {
        tag: best_tag,
        score: best_score,
        margin,
        reason: "embed-analyze",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagSamples;

    fn cache_with_tag(tag: &str, positive: Vec<Vec<f32>>) -> RoutingCache {
        let mut cache = RoutingCache::empty("m1", 3, 30);
        cache.per_tag.insert(
            tag.to_string(),
            TagSamples {
                sample_count: positive.len(),
                positive,
            },
        );
        cache
    }

    #[test]
    fn no_tags_routes_unrouted() {
        let cache = RoutingCache::empty("m1", 3, 30);
        let decision = route_embedding(&cache, &[1.0, 0.0, 0.0], &ThresholdOverrides::new());
        assert_eq!(
            decision,
            RoutingDecision::Analyze {
                tag: UNROUTED_TAG.to_string(),
                score: 0.0,
                margin: 0.0,
                reason: "embed-unrouted",
            }
        );
    }

    #[test]
    fn low_score_is_ignored() {
        let cache = cache_with_tag("policy", vec![vec![0.0, 1.0, 0.0]]);
        let decision = route_embedding(&cache, &[1.0, 0.0, 0.0], &ThresholdOverrides::new());
        assert_eq!(decision, RoutingDecision::Ignore { reason: "embed-low" });
    }

    #[test]
    fn high_confidence_match_is_auto_high() {
        let cache = cache_with_tag("policy", vec![vec![1.0, 0.0, 0.0]]);
        let decision = route_embedding(&cache, &[1.0, 0.0, 0.0], &ThresholdOverrides::new());
        match decision {
            RoutingDecision::AutoHigh { tag, importance, .. } => {
                assert_eq!(tag, "policy");
                assert_eq!(importance, 5);
            }
            other => panic!("expected auto-high, got {other:?}"),
        }
    }

    #[test]
    fn mid_confidence_match_is_analyze() {
        let mut cache = cache_with_tag("policy", vec![vec![1.0, 0.0, 0.0]]);
        // A second, near-identical tag drags the margin down below highMargin.
        cache.per_tag.insert(
            "markets".to_string(),
            TagSamples {
                positive: vec![vec![0.99, 0.1411, 0.0]],
                sample_count: 1,
            },
        );
        let decision = route_embedding(&cache, &[0.9, 0.3, 0.0], &ThresholdOverrides::new());
        assert!(matches!(decision, RoutingDecision::Analyze { .. } | RoutingDecision::Ignore { .. }));
    }

    #[test]
    fn negative_centroid_can_override_ignore() {
        let mut cache = cache_with_tag("policy", vec![vec![1.0, 0.0, 0.0]]);
        cache.negative_samples = vec![vec![1.0, 0.0, 0.0]];
        let decision = route_embedding(&cache, &[1.0, 0.0, 0.0], &ThresholdOverrides::new());
        assert_eq!(
            decision,
            RoutingDecision::Ignore {
                reason: "embed-negative"
            }
        );
    }

    #[test]
    fn ties_break_by_tag_name_ascending() {
        let mut cache = cache_with_tag("zebra", vec![vec![1.0, 0.0, 0.0]]);
        cache.per_tag.insert(
            "alpha".to_string(),
            TagSamples {
                positive: vec![vec![1.0, 0.0, 0.0]],
                sample_count: 1,
            },
        );
        let decision = route_embedding(&cache, &[1.0, 0.0, 0.0], &ThresholdOverrides::new());
        // A tied margin of 0 falls short of highMargin, so this analyzes
        // rather than auto-promotes; the tie-break still picks "alpha".
        match decision {
            RoutingDecision::Analyze { tag, .. } => assert_eq!(tag, "alpha"),
            other => panic!("expected analyze, got {other:?}"),
        }
    }
}
