//! Classifier output: the structured judgment of a post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed verdict set (spec.md section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ignore,
    Watch,
    Actionable,
}

/// 1:1 with Post by external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub post_id: Uuid,
    pub external_id: String,
    pub verdict: Verdict,
    pub summary: Option<String>,
    pub importance: Option<u8>,
    pub tags: Vec<String>,
    pub suggestion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fallback tag used when no closed-set tag applies.
pub const FALLBACK_TAG: &str = "other";

impl Insight {
    /// Construct an insight, enforcing the cross-field invariant:
    /// `verdict=actionable => suggestion non-empty`, otherwise the
    /// verdict is coerced down to `watch` and importance capped at 3.
    pub fn new(
        post_id: Uuid,
        external_id: impl Into<String>,
        verdict: Verdict,
        summary: Option<String>,
        importance: Option<u8>,
        tags: Vec<String>,
        suggestion: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let tags = if tags.is_empty() {
            vec![FALLBACK_TAG.to_string()]
        } else {
            tags
        };
        let summary = summary.map(|s| normalize_summary(&s));

        let (verdict, importance) = coerce_actionable_requires_suggestion(
            verdict,
            importance,
            suggestion.as_deref(),
        );

        Self {
            post_id,
            external_id: external_id.into(),
            verdict,
            summary,
            importance,
            tags,
            suggestion,
            created_at: now,
            updated_at: now,
        }
    }

    /// Synthesized low-value insight for rule-filter-dropped or
    /// embedding-router-ignored posts.
    pub fn synthesize_ignored(post_id: Uuid, external_id: impl Into<String>) -> Self {
        Self::new(
            post_id,
            external_id,
            Verdict::Ignore,
            None,
            Some(1),
            vec![FALLBACK_TAG.to_string()],
            None,
        )
    }

    /// Synthesized watch-tier insight for embedding-router auto-high posts.
    pub fn synthesize_auto_high(
        post_id: Uuid,
        external_id: impl Into<String>,
        tag: impl Into<String>,
        importance: u8,
    ) -> Self {
        Self::new(
            post_id,
            external_id,
            Verdict::Watch,
            None,
            Some(importance),
            vec![tag.into()],
            None,
        )
    }

    /// Synthesized default for a post the LLM batch response omitted.
    pub fn synthesize_llm_default(post_id: Uuid, external_id: impl Into<String>, text: &str) -> Self {
        Self::new(
            post_id,
            external_id,
            Verdict::Watch,
            Some(truncate_chars(text, 80)),
            Some(2),
            vec![FALLBACK_TAG.to_string()],
            None,
        )
    }
}

/// `verdict=actionable ⇒ suggestion non-empty`; otherwise coerce to
/// `watch` and cap importance at 3.
fn coerce_actionable_requires_suggestion(
    verdict: Verdict,
    importance: Option<u8>,
    suggestion: Option<&str>,
) -> (Verdict, Option<u8>) {
    let suggestion_present = suggestion.map(|s| !s.trim().is_empty()).unwrap_or(false);
    if verdict == Verdict::Actionable && !suggestion_present {
        let capped = importance.map(|i| i.min(3));
        (Verdict::Watch, capped)
    } else {
        (verdict, importance)
    }
}

/// Collapse whitespace and trim, then hard-cap at 120 chars (summary
/// field invariant: "optional summary (≤120 chars after normalization)").
fn normalize_summary(s: &str) -> String {
    let collapsed: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, 120)
}

pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actionable_without_suggestion_demotes_to_watch() {
        let insight = Insight::new(
            Uuid::new_v4(),
            "e1",
            Verdict::Actionable,
            None,
            Some(5),
            vec!["policy".into()],
            None,
        );
        assert_eq!(insight.verdict, Verdict::Watch);
        assert_eq!(insight.importance, Some(3));
    }

    #[test]
    fn actionable_with_suggestion_keeps_verdict() {
        let insight = Insight::new(
            Uuid::new_v4(),
            "e1",
            Verdict::Actionable,
            None,
            Some(5),
            vec!["policy".into()],
            Some("follow up".into()),
        );
        assert_eq!(insight.verdict, Verdict::Actionable);
        assert_eq!(insight.importance, Some(5));
    }

    #[test]
    fn empty_tags_fall_back_to_other() {
        let insight = Insight::new(Uuid::new_v4(), "e1", Verdict::Watch, None, None, vec![], None);
        assert_eq!(insight.tags, vec![FALLBACK_TAG.to_string()]);
    }

    #[test]
    fn summary_normalized_and_capped() {
        let long = "word ".repeat(40);
        let insight = Insight::new(
            Uuid::new_v4(),
            "e1",
            Verdict::Watch,
            Some(long),
            None,
            vec!["other".into()],
            None,
        );
        assert!(insight.summary.unwrap().chars().count() <= 120);
    }
}
