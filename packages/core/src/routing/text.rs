//! Rule-based pre-filter and embedding-text normalization.
//!
//! Two independent jobs live here: deciding whether a post is worth
//! embedding at all (rule filter), and turning surviving text into the
//! normalized string that gets hashed and sent to the embedding service.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static NUMERIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?%?").unwrap());
static AMOUNT_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?\d|\d\s?(usd|eur|gbp|btc|eth|million|billion|bps|%)").unwrap()
});
static TIME_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(today|tomorrow|yesterday|q[1-4]|20\d{2}|jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec|hour|day|week|month|quarter)\b").unwrap()
});
static TICKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[A-Z]{2,6}\b").unwrap());
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const HIGH_SIGNAL_KEYWORDS: &[&str] = &[
    "announce", "announces", "announced", "sec ", "regulation", "policy", "lawsuit", "merger",
    "acquisition", "partnership", "funding", "raise", "ipo", "hack", "exploit", "breach", "recall",
    "ban", "banned", "sanction", "investigation", "earnings", "revenue", "layoff", "resign",
];

const LOW_VALUE_LANGS: &[&str] = &["zxx", "und", "mul", "qaa"];

/// Why the rule filter dropped a post, or that it kept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDecision {
    Keep,
    Drop(RuleDropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDropReason {
    LowLang,
    LowInfoShort,
    RuleDrop,
}

impl RuleDropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleDropReason::LowLang => "low-lang",
            RuleDropReason::LowInfoShort => "low-info-short",
            RuleDropReason::RuleDrop => "rule-drop",
        }
    }
}

/// Whitespace-normalized text plus the signal booleans computed from it.
struct RuleSignals {
    length: usize,
    numeric_tokens: usize,
    has_high_signal_keyword: bool,
    has_amount_unit: bool,
    has_time_unit: bool,
    has_ticker: bool,
}

fn compute_signals(normalized: &str) -> RuleSignals {
    let lower = normalized.to_lowercase();
    RuleSignals {
        length: normalized.chars().count(),
        numeric_tokens: NUMERIC_TOKEN.find_iter(normalized).count(),
        has_high_signal_keyword: HIGH_SIGNAL_KEYWORDS.iter().any(|k| lower.contains(k)),
        has_amount_unit: AMOUNT_UNIT.is_match(normalized),
        has_time_unit: TIME_UNIT.is_match(normalized),
        has_ticker: TICKER.is_match(normalized),
    }
}

/// Apply the rule-based pre-filter (spec.md section 4.4.1). Idempotent:
/// the same normalized text always yields the same decision.
pub fn rule_filter(text: &str, lang: Option<&str>) -> RuleDecision {
    let normalized = WHITESPACE.replace_all(text.trim(), " ").to_string();
    let signals = compute_signals(&normalized);
    let low_value_lang = lang
        .map(|l| LOW_VALUE_LANGS.contains(&l.to_lowercase().as_str()))
        .unwrap_or(false);

    let keep = signals.has_high_signal_keyword
        || (signals.has_amount_unit && signals.has_time_unit)
        || (signals.length >= 160 && signals.numeric_tokens >= 3)
        || (signals.has_ticker && signals.numeric_tokens >= 2);

    if keep {
        return RuleDecision::Keep;
    }

    if low_value_lang {
        return RuleDecision::Drop(RuleDropReason::LowLang);
    }
    if signals.length < 80
        && signals.numeric_tokens <= 1
        && !signals.has_high_signal_keyword
        && !signals.has_amount_unit
        && !signals.has_ticker
    {
        return RuleDecision::Drop(RuleDropReason::LowInfoShort);
    }
    RuleDecision::Drop(RuleDropReason::RuleDrop)
}

const EMBEDDING_TEXT_MAX_CHARS: usize = 320;

/// Strip URLs/mentions, collapse whitespace, optionally prefix a language
/// tag, and truncate to the embedding text budget (spec.md section 4.4.2
/// step 1).
pub fn normalize_embedding_text(text: &str, lang: Option<&str>) -> String {
    let stripped = MENTION.replace_all(&URL.replace_all(text, ""), "");
    let collapsed = WHITESPACE.replace_all(stripped.trim(), " ").to_string();
    let prefixed = match lang {
        Some(l) if !l.is_empty() => format!("[{l}] {collapsed}"),
        _ => collapsed,
    };
    prefixed.chars().take(EMBEDDING_TEXT_MAX_CHARS).collect()
}

/// SHA-256 hex digest of the normalized embedding text, used to detect
/// when a stored embedding is stale relative to the current post text.
pub fn text_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_signal_keyword_keeps() {
        let text = "SEC announces new ETF policy effective 2026-02-01; $BTC reaction to 4% gain";
        assert_eq!(rule_filter(text, Some("en")), RuleDecision::Keep);
    }

    #[test]
    fn tiny_greeting_is_low_info_short() {
        assert_eq!(
            rule_filter("gm", Some("en")),
            RuleDecision::Drop(RuleDropReason::LowInfoShort)
        );
    }

    #[test]
    fn low_value_lang_wins_over_info_check_when_no_signals() {
        assert_eq!(
            rule_filter("asdkjhasdkjhaksjdhaksjdhkasjhdaksjdhaksjdh filler text of no value at all here", Some("zxx")),
            RuleDecision::Drop(RuleDropReason::LowLang)
        );
    }

    #[test]
    fn amount_and_time_together_keep() {
        assert_eq!(
            rule_filter("revenue up 12% this quarter versus last quarter results", Some("en")),
            RuleDecision::Keep
        );
    }

    #[test]
    fn rule_filter_is_idempotent() {
        let text = "a fairly unremarkable post about nothing in particular today";
        assert_eq!(rule_filter(text, Some("en")), rule_filter(text, Some("en")));
    }

    #[test]
    fn embedding_text_strips_urls_and_mentions() {
        let text = "check this out https://example.com/x @someone great read";
        let normalized = normalize_embedding_text(text, None);
        assert!(!normalized.contains("http"));
        assert!(!normalized.contains('@'));
    }

    #[test]
    fn embedding_text_truncates_to_budget() {
        let text = "a".repeat(1000);
        let normalized = normalize_embedding_text(&text, None);
        assert_eq!(normalized.chars().count(), EMBEDDING_TEXT_MAX_CHARS);
    }

    #[test]
    fn text_hash_is_deterministic() {
        assert_eq!(text_hash("same"), text_hash("same"));
        assert_ne!(text_hash("same"), text_hash("different"));
    }
}
