//! Adaptive per-tag thresholds derived from a tag's intra-cluster score
//! distribution (spec.md section 4.4.2).

use crate::types::TagThresholds;

/// Minimum sample count before a tag's statistics are trusted enough to
/// adapt thresholds away from the defaults (spec.md section 9: "minimum
/// sample count for statistics (>=10)").
pub const MIN_SAMPLE_COUNT_FOR_ADAPTATION: usize = 10;

/// Maximum drift allowed from the hardcoded defaults, in either direction.
const MAX_DRIFT: f32 = 0.05;

/// Percentile summary over a tag's intra-cluster cosine scores against its
/// own centroid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreStats {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub p25: f32,
    pub p50: f32,
    pub p75: f32,
}

/// Compute {mean, min, max, p25, p50, p75} over a sorted-in-place copy of
/// `scores`. Returns `None` if `scores` is empty.
pub fn score_stats(scores: &[f32]) -> Option<ScoreStats> {
    if scores.is_empty() {
        return None;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let percentile = |p: f32| -> f32 {
        let idx = ((n.saturating_sub(1)) as f32 * p).round() as usize;
        sorted[idx.min(n - 1)]
    };
    Some(ScoreStats {
        mean: sorted.iter().sum::<f32>() / n as f32,
        min: sorted[0],
        max: sorted[n - 1],
        p25: percentile(0.25),
        p50: percentile(0.5),
        p75: percentile(0.75),
    })
}

fn clamp_drift(default: f32, target: f32) -> f32 {
    let shifted = (default + target) / 2.0;
    shifted.clamp(default - MAX_DRIFT, default + MAX_DRIFT)
}

/// Derive adaptive thresholds for one tag from its score statistics,
/// starting from `defaults`. Below `MIN_SAMPLE_COUNT_FOR_ADAPTATION`
/// samples, returns `defaults` unchanged (spec.md section 9).
pub fn adapt_thresholds(defaults: TagThresholds, stats: Option<ScoreStats>, sample_count: usize) -> TagThresholds {
    let Some(stats) = stats else {
        return defaults;
    };
    if sample_count < MIN_SAMPLE_COUNT_FOR_ADAPTATION {
        return defaults;
    }

    let low_sim = clamp_drift(defaults.low_sim, stats.p25);
    let high_sim = clamp_drift(defaults.high_sim, stats.p75);
    let mut high_margin = defaults.high_margin;
    if stats.p75 - stats.p50 < 0.02 {
        high_margin += 0.01;
    }

    let high_strict = defaults.high_strict.max(high_sim + 0.02);
    let high_sim = if high_sim - low_sim < 0.02 {
        low_sim + 0.02
    } else {
        high_sim
    };

    TagThresholds {
        low_sim,
        high_sim,
        high_strict,
        high_margin,
        neg_gap_low: defaults.neg_gap_low,
        neg_gap_high: defaults.neg_gap_high,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_min_sample_count_keeps_defaults() {
        let defaults = TagThresholds::default();
        let stats = score_stats(&[0.5, 0.6, 0.7]).unwrap();
        let adapted = adapt_thresholds(defaults, Some(stats), 3);
        assert_eq!(adapted, defaults);
    }

    #[test]
    fn drift_is_clamped_to_max_drift() {
        let defaults = TagThresholds::default();
        // Extremely low p25 should not pull low_sim down by more than MAX_DRIFT.
        let scores: Vec<f32> = (0..20).map(|_| 0.1).collect();
        let stats = score_stats(&scores).unwrap();
        let adapted = adapt_thresholds(defaults, Some(stats), 20);
        assert!(adapted.low_sim >= defaults.low_sim - MAX_DRIFT - 1e-6);
    }

    #[test]
    fn high_strict_always_at_least_high_sim_plus_margin() {
        let defaults = TagThresholds::default();
        let scores: Vec<f32> = (0..20).map(|i| 0.8 + (i as f32) * 0.001).collect();
        let stats = score_stats(&scores).unwrap();
        let adapted = adapt_thresholds(defaults, Some(stats), 20);
        assert!(adapted.high_strict >= adapted.high_sim + 0.02 - 1e-6);
        assert!(adapted.high_sim - adapted.low_sim >= 0.02 - 1e-6);
    }

    #[test]
    fn tight_p75_p50_gap_bumps_margin() {
        let defaults = TagThresholds::default();
        let mut scores = vec![0.80; 20];
        scores[19] = 0.805;
        let stats = score_stats(&scores).unwrap();
        let adapted = adapt_thresholds(defaults, Some(stats), 20);
        assert!(adapted.high_margin > defaults.high_margin);
    }

    #[test]
    fn empty_scores_yield_defaults() {
        let defaults = TagThresholds::default();
        assert_eq!(adapt_thresholds(defaults, None, 0), defaults);
    }
}
