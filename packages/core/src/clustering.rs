//! Greedy single-pass clustering of scored insights by cosine similarity
//! (spec.md section 4.7), used by the cluster-mode report renderer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::routing_cache::normalize;

/// One item eligible for clustering: an insight with a fresh embedding.
#[derive(Debug, Clone)]
pub struct ClusterCandidate {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub importance: u8,
    pub tags: Vec<String>,
    pub posted_at: DateTime<Utc>,
}

/// A formed cluster: running centroid, member list, and a representative
/// item promoted as members are added.
#[derive(Debug, Clone)]
pub struct Cluster {
    centroid: Vec<f32>,
    /// Unnormalized running sum backing `centroid`.
    sum: Vec<f32>,
    pub members: Vec<ClusterCandidate>,
    pub representative: ClusterCandidate,
    pub tags: Vec<String>,
}

impl Cluster {
    fn new(first: ClusterCandidate) -> Self {
        let sum = first.vector.clone();
        let centroid = normalize(&sum).unwrap_or_else(|| sum.clone());
        let tags = first.tags.clone();
        Self {
            centroid,
            sum,
            representative: first.clone(),
            members: vec![first],
            tags,
        }
    }

    fn score(&self, vector: &[f32]) -> f32 {
        dot(&self.centroid, vector)
    }

    fn primary_tag(&self) -> Option<&str> {
        self.tags.first().map(|s| s.as_str())
    }

    fn add(&mut self, candidate: ClusterCandidate) {
        for (i, x) in candidate.vector.iter().enumerate() {
            if let Some(slot) = self.sum.get_mut(i) {
                *slot += x;
            }
        }
        self.centroid = normalize(&self.sum).unwrap_or_else(|| self.sum.clone());

        if is_more_notable(&candidate, &self.representative) {
            self.representative = candidate.clone();
        }
        self.members.push(candidate);
        self.tags = top_tags(&self.members, 5);
    }

    pub fn peak_importance(&self) -> u8 {
        self.members.iter().map(|m| m.importance).max().unwrap_or(0)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `(importance, postedAt)` lexicographic comparison used both for sort
/// order and representative promotion.
fn is_more_notable(a: &ClusterCandidate, b: &ClusterCandidate) -> bool {
    (a.importance, a.posted_at) > (b.importance, b.posted_at)
}

fn top_tags(members: &[ClusterCandidate], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in members {
        for t in &m.tags {
            *counts.entry(t.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(n).map(|(t, _)| t.to_string()).collect()
}

/// Tags intersect between a candidate and a cluster's current tag list.
fn tags_intersect(candidate_tags: &[String], cluster_tags: &[String]) -> bool {
    candidate_tags.iter().any(|t| cluster_tags.contains(t))
}

/// Greedily cluster `candidates` by cosine similarity to each cluster's
/// running centroid, with a same-tag/cross-tag threshold split
/// (spec.md section 4.7).
///
/// `base_threshold` is the similarity required to join a cluster sharing
/// (or intersecting) the candidate's primary tag; `cross_tag_bump` is
/// added (capped at 0.98) for clusters with no tag overlap.
pub fn cluster(mut candidates: Vec<ClusterCandidate>, base_threshold: f32, cross_tag_bump: f32) -> Vec<Cluster> {
    candidates.sort_by(|a, b| {
        (b.importance, b.posted_at)
            .partial_cmp(&(a.importance, a.posted_at))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut clusters: Vec<Cluster> = Vec::new();

    for candidate in candidates {
        let mut best: Option<(usize, f32)> = None;
        for (idx, cl) in clusters.iter().enumerate() {
            let same_tag = cl
                .primary_tag()
                .map(|t| candidate.tags.first().map(|c| c == t).unwrap_or(false))
                .unwrap_or(false)
                || tags_intersect(&candidate.tags, &cl.tags);
            let required = if same_tag {
                base_threshold
            } else {
                (base_threshold + cross_tag_bump).min(0.98)
            };
            let score = cl.score(&candidate.vector);
            if score >= required {
                match best {
                    Some((_, best_score)) if best_score >= score => {}
                    _ => best = Some((idx, score)),
                }
            }
        }

        match best {
            Some((idx, _)) => clusters[idx].add(candidate),
            None => clusters.push(Cluster::new(candidate)),
        }
    }

    clusters.sort_by(|a, b| {
        (b.peak_importance(), b.members.len(), b.representative.posted_at)
            .partial_cmp(&(a.peak_importance(), a.members.len(), a.representative.posted_at))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(tag: &str, importance: u8, vector: Vec<f32>) -> ClusterCandidate {
        ClusterCandidate {
            id: Uuid::new_v4(),
            vector,
            importance,
            tags: vec![tag.to_string()],
            posted_at: Utc::now(),
        }
    }

    #[test]
    fn identical_vectors_same_tag_merge() {
        let candidates = vec![
            candidate("policy", 5, vec![1.0, 0.0, 0.0]),
            candidate("policy", 4, vec![1.0, 0.0, 0.0]),
        ];
        let clusters = cluster(candidates, 0.9, 0.05);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }

    #[test]
    fn threshold_of_one_means_every_post_is_singleton() {
        let candidates = vec![
            candidate("policy", 5, vec![1.0, 0.0, 0.0]),
            candidate("policy", 4, vec![0.999, 0.001, 0.0]),
        ];
        let clusters = cluster(candidates, 1.0, 0.0);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn threshold_of_zero_collapses_everything() {
        let candidates = vec![
            candidate("policy", 5, vec![1.0, 0.0, 0.0]),
            candidate("markets", 4, vec![0.0, 1.0, 0.0]),
            candidate("crypto", 3, vec![-1.0, 0.0, 0.0]),
        ];
        let clusters = cluster(candidates, 0.0, 0.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 3);
    }

    #[test]
    fn cross_tag_requires_higher_similarity() {
        // Same vector but different tag, base threshold below the raw
        // similarity but cross-tag-bumped threshold above it.
        let candidates = vec![
            candidate("policy", 5, vec![1.0, 0.0, 0.0]),
            candidate("markets", 4, vec![0.95, 0.31, 0.0]),
        ];
        let clusters = cluster(candidates, 0.9, 0.2);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn representative_is_most_notable_member() {
        let older = candidate("policy", 3, vec![1.0, 0.0, 0.0]);
        let newer_more_important = candidate("policy", 5, vec![1.0, 0.0, 0.0]);
        let clusters = cluster(vec![older, newer_more_important.clone()], 0.5, 0.1);
        assert_eq!(clusters[0].representative.id, newer_more_important.id);
    }

    #[test]
    fn clusters_sorted_by_peak_importance_desc() {
        let low = candidate("markets", 2, vec![0.0, 1.0, 0.0]);
        let high = candidate("policy", 5, vec![1.0, 0.0, 0.0]);
        let clusters = cluster(vec![low, high], 0.95, 0.02);
        assert_eq!(clusters[0].peak_importance(), 5);
    }
}
