//! Grouping of `routed` posts into LLM-dispatch batches
//! (spec.md section 4.4.3).

use uuid::Uuid;

use crate::types::Post;

/// Default per-tag minimum before a dispatch batch is worth sending
/// (`CLASSIFY_TAG_MIN_TWEETS`).
pub const DEFAULT_TAG_MIN_TWEETS: usize = 10;

/// Posts per `classify-tweets-llm` job payload.
pub const DISPATCH_BATCH_SIZE: usize = 50;

/// Candidates considered per tag per sweep, oldest-routed first.
pub const DISPATCH_CANDIDATE_CAP: usize = 1000;

/// One group of post ids to enqueue as a single `classify-tweets-llm` job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchBatch {
    pub tag: String,
    pub post_ids: Vec<Uuid>,
}

/// Given all posts currently `routed` under one tag (already sorted
/// oldest-routed first by the caller's query), produce the batches worth
/// dispatching this sweep, or `None` if the tag's inventory is still
/// below `tag_min`.
pub fn plan_batches_for_tag(tag: &str, routed_oldest_first: &[Post], tag_min: usize) -> Option<Vec<DispatchBatch>> {
    if routed_oldest_first.len() < tag_min {
        return None;
    }
    let candidates = &routed_oldest_first[..routed_oldest_first.len().min(DISPATCH_CANDIDATE_CAP)];
    let batches = candidates
        .chunks(DISPATCH_BATCH_SIZE)
        .map(|chunk| DispatchBatch {
            tag: tag.to_string(),
            post_ids: chunk.iter().map(|p| p.id).collect(),
        })
        .collect();
    Some(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn routed_post(tag: &str) -> Post {
        use crate::types::post::FetchedPost;
        let mut p = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                text: "x".into(),
                lang: None,
                author_handle: "a".into(),
                raw_metadata: serde_json::json!({}),
            },
        );
        p.mark_routed(tag, 0.9, 0.1, "embed-analyze", Utc::now());
        p
    }

    #[test]
    fn below_tag_min_defers() {
        let posts: Vec<Post> = (0..5).map(|_| routed_post("policy")).collect();
        assert!(plan_batches_for_tag("policy", &posts, 10).is_none());
    }

    #[test]
    fn at_or_above_tag_min_batches_at_fifty() {
        let posts: Vec<Post> = (0..120).map(|_| routed_post("policy")).collect();
        let batches = plan_batches_for_tag("policy", &posts, 10).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].post_ids.len(), 50);
        assert_eq!(batches[2].post_ids.len(), 20);
    }

    #[test]
    fn candidate_cap_truncates_per_sweep() {
        let posts: Vec<Post> = (0..1500).map(|_| routed_post("policy")).collect();
        let batches = plan_batches_for_tag("policy", &posts, 10).unwrap();
        let total: usize = batches.iter().map(|b| b.post_ids.len()).sum();
        assert_eq!(total, DISPATCH_CANDIDATE_CAP);
    }
}
