//! Pure LLM response post-processing (spec.md section 4.5): JSON
//! extraction tolerant of fenced/surrounding text, verdict/importance/tag
//! coercion, and content-risk pattern matching. Kept free of any HTTP
//! concerns so it can be unit tested without a live model and reused by
//! both the batched classifier and the report generator's mid-tier judge.

use std::collections::HashMap;

use regex::Regex;
use uuid::Uuid;

use crate::types::{Insight, Verdict};

/// One item as the model returns it, before coercion.
#[derive(Debug, Clone, Default)]
pub struct RawLlmItem {
    pub tweet_id: String,
    pub verdict: Option<String>,
    pub summary: Option<String>,
    pub importance: Option<i64>,
    pub tags: Vec<String>,
    pub suggestion: Option<String>,
}

/// Extract the outermost `{...}` JSON object from `text`, tolerating a
/// fenced ` ```json ... ``` ` block or other surrounding prose
/// (spec.md section 4.5: "extract the outermost substring").
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// True if `text` matches any configured content-risk pattern
/// (spec.md section 4.5, 7-3; section 9's "regex-based content risk
/// detection" redesign note).
pub fn is_content_risk(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Coerce a raw verdict string to the closed set, defaulting to `ignore`
/// (spec.md section 4.5: "Coerce verdict to the closed set (default ignore)").
pub fn coerce_verdict(raw: Option<&str>) -> Verdict {
    match raw.map(|s| s.to_lowercase()) {
        Some(s) if s == "watch" => Verdict::Watch,
        Some(s) if s == "actionable" => Verdict::Actionable,
        Some(s) if s == "ignore" => Verdict::Ignore,
        _ => Verdict::Ignore,
    }
}

/// Clamp importance to `[1,5]` by rounding; absent stays absent
/// (spec.md section 4.5: "Clamp importance to [1,5] by rounding").
pub fn clamp_importance(raw: Option<i64>) -> Option<u8> {
    raw.map(|i| i.clamp(1, 5) as u8)
}

/// Normalize tags: apply the alias map, keep only tags in the allowed
/// set, fall back to `other` if none remain, and dedupe preserving first
/// appearance (spec.md section 4.5).
pub fn normalize_tags(raw: &[String], allowed: &[String], aliases: &HashMap<String, String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in raw {
        let resolved = aliases.get(tag).cloned().unwrap_or_else(|| tag.clone());
        if allowed.iter().any(|a| a == &resolved) && seen.insert(resolved.clone()) {
            out.push(resolved);
        }
    }
    if out.is_empty() {
        out.push(crate::types::insight::FALLBACK_TAG.to_string());
    }
    out
}

/// Turn one raw item (or its absence) into an `Insight` for `post_id`,
/// applying every coercion rule in spec.md section 4.5. `raw_text` is the
/// post's own text, used for the synthesized-default summary when the
/// model omitted this post entirely.
pub fn coerce_item(
    post_id: Uuid,
    external_id: &str,
    raw_text: &str,
    item: Option<&RawLlmItem>,
    allowed_tags: &[String],
    tag_aliases: &HashMap<String, String>,
) -> Insight {
    let Some(item) = item else {
        return Insight::synthesize_llm_default(post_id, external_id, raw_text);
    };

    let verdict = coerce_verdict(item.verdict.as_deref());
    let importance = clamp_importance(item.importance);
    let tags = normalize_tags(&item.tags, allowed_tags, tag_aliases);

    Insight::new(
        post_id,
        external_id,
        verdict,
        item.summary.clone(),
        importance,
        tags,
        item.suggestion.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_block_with_prose() {
        let text = "Sure, here you go:\n```json\n{\"items\":[]}\n```\nhope that helps";
        assert_eq!(extract_json_object(text), Some("{\"items\":[]}"));
    }

    #[test]
    fn extracts_bare_json() {
        assert_eq!(extract_json_object("{\"a\":1}"), Some("{\"a\":1}"));
    }

    #[test]
    fn no_braces_returns_none() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn content_risk_pattern_matches() {
        let patterns = vec![Regex::new("上下文过长").unwrap()];
        assert!(is_content_risk("error: 上下文过长", &patterns));
        assert!(!is_content_risk("error: timeout", &patterns));
    }

    #[test]
    fn unknown_verdict_defaults_to_ignore() {
        assert_eq!(coerce_verdict(Some("maybe")), Verdict::Ignore);
        assert_eq!(coerce_verdict(None), Verdict::Ignore);
    }

    #[test]
    fn importance_clamped_and_rounded() {
        assert_eq!(clamp_importance(Some(-3)), Some(1));
        assert_eq!(clamp_importance(Some(9)), Some(5));
        assert_eq!(clamp_importance(Some(3)), Some(3));
        assert_eq!(clamp_importance(None), None);
    }

    #[test]
    fn tags_normalized_via_alias_and_fallback() {
        let allowed = vec!["policy".to_string(), "markets".to_string()];
        let mut aliases = HashMap::new();
        aliases.insert("regulation".to_string(), "policy".to_string());

        let tags = normalize_tags(&["regulation".to_string(), "nonsense".to_string()], &allowed, &aliases);
        assert_eq!(tags, vec!["policy".to_string()]);

        let empty = normalize_tags(&["nonsense".to_string()], &allowed, &aliases);
        assert_eq!(empty, vec!["other".to_string()]);
    }

    #[test]
    fn tags_dedupe_preserving_first_appearance() {
        let allowed = vec!["policy".to_string()];
        let tags = normalize_tags(
            &["policy".to_string(), "policy".to_string()],
            &allowed,
            &HashMap::new(),
        );
        assert_eq!(tags, vec!["policy".to_string()]);
    }

    #[test]
    fn missing_item_synthesizes_default() {
        let insight = coerce_item(Uuid::new_v4(), "e1", "some post text", None, &[], &HashMap::new());
        assert_eq!(insight.verdict, Verdict::Watch);
        assert_eq!(insight.importance, Some(2));
        assert_eq!(insight.tags, vec!["other".to_string()]);
    }

    #[test]
    fn actionable_without_suggestion_demotes() {
        let item = RawLlmItem {
            tweet_id: "e1".to_string(),
            verdict: Some("actionable".to_string()),
            summary: Some("s".to_string()),
            importance: Some(5),
            tags: vec!["policy".to_string()],
            suggestion: None,
        };
        let allowed = vec!["policy".to_string()];
        let insight = coerce_item(Uuid::new_v4(), "e1", "text", Some(&item), &allowed, &HashMap::new());
        assert_eq!(insight.verdict, Verdict::Watch);
        assert_eq!(insight.importance, Some(3));
    }
}
