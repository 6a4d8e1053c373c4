//! Profile-based survivor filtering (spec.md section 4.6 step 2).

use crate::traits::store::InsightWithPost;
use crate::types::{ReportProfile, Verdict};

/// Apply a profile's importance floor, verdict whitelist, and
/// tag/author include-exclude lists to one candidate window.
pub fn apply_profile_filters(candidates: Vec<InsightWithPost>, profile: &ReportProfile) -> Vec<InsightWithPost> {
    candidates
        .into_iter()
        .filter(|c| passes_profile(c, profile))
        .collect()
}

fn passes_profile(candidate: &InsightWithPost, profile: &ReportProfile) -> bool {
    let importance = candidate.insight.importance.unwrap_or(0);
    if importance < profile.min_importance {
        return false;
    }
    if let Some(whitelist) = &profile.verdict_whitelist {
        if !whitelist.contains(&candidate.insight.verdict) {
            return false;
        }
    }
    if !list_allows(&profile.tag_include, &profile.tag_exclude, &candidate.insight.tags) {
        return false;
    }
    if !list_allows(
        &profile.author_include,
        &profile.author_exclude,
        std::slice::from_ref(&candidate.post.author_handle),
    ) {
        return false;
    }
    true
}

/// `include` empty means "allow everything not excluded"; non-empty means
/// "at least one of `items` must appear in `include`". `exclude` always
/// vetoes regardless of `include`.
fn list_allows(include: &[String], exclude: &[String], items: &[String]) -> bool {
    if items.iter().any(|i| exclude.contains(i)) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    items.iter().any(|i| include.contains(i))
}

/// Mid-tier band eligible for the optional AI re-triage pass
/// (spec.md section 4.6 step 3): importance in [2,3].
pub fn is_mid_tier(importance: Option<u8>) -> bool {
    matches!(importance, Some(2) | Some(3))
}

/// High-tier items (importance >= 4) are always kept without AI re-triage.
pub fn is_high_tier(importance: Option<u8>) -> bool {
    importance.map(|i| i >= 4).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::post::FetchedPost;
    use crate::types::{Insight, Post};
    use chrono::Utc;
    use uuid::Uuid;

    fn candidate(importance: u8, verdict: Verdict, tags: Vec<&str>, author: &str) -> InsightWithPost {
        let post_id = Uuid::new_v4();
        let mut post = Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: post_id.to_string(),
                created_at: Utc::now(),
                text: "x".into(),
                lang: None,
                author_handle: author.into(),
                raw_metadata: serde_json::json!({}),
            },
        );
        post.id = post_id;
        let insight = Insight::new(
            post_id,
            post.external_id.clone(),
            verdict,
            None,
            Some(importance),
            tags.into_iter().map(String::from).collect(),
            None,
        );
        InsightWithPost { insight, post }
    }

    #[test]
    fn importance_floor_excludes_below_min() {
        let mut profile = ReportProfile::new("p", 24);
        profile.min_importance = 3;
        let low = candidate(2, Verdict::Watch, vec!["policy"], "a");
        assert!(!passes_profile(&low, &profile));
    }

    #[test]
    fn verdict_whitelist_filters() {
        let mut profile = ReportProfile::new("p", 24);
        profile.verdict_whitelist = Some(vec![Verdict::Actionable]);
        let watch = candidate(5, Verdict::Watch, vec!["policy"], "a");
        assert!(!passes_profile(&watch, &profile));
    }

    #[test]
    fn tag_exclude_overrides_include() {
        let mut profile = ReportProfile::new("p", 24);
        profile.tag_include = vec!["policy".into()];
        profile.tag_exclude = vec!["policy".into()];
        let item = candidate(5, Verdict::Watch, vec!["policy"], "a");
        assert!(!passes_profile(&item, &profile));
    }

    #[test]
    fn author_include_requires_membership() {
        let mut profile = ReportProfile::new("p", 24);
        profile.author_include = vec!["trusted".into()];
        let other = candidate(5, Verdict::Watch, vec!["policy"], "untrusted");
        assert!(!passes_profile(&other, &profile));
        let trusted = candidate(5, Verdict::Watch, vec!["policy"], "trusted");
        assert!(passes_profile(&trusted, &profile));
    }

    #[test]
    fn mid_and_high_tier_bands() {
        assert!(is_mid_tier(Some(2)));
        assert!(is_mid_tier(Some(3)));
        assert!(!is_mid_tier(Some(4)));
        assert!(is_high_tier(Some(4)));
        assert!(!is_high_tier(Some(3)));
    }
}
