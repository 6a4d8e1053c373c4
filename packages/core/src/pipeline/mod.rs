//! Job handlers wiring the routing/report/queue/lock engines into the
//! four job types a worker processes (spec.md section 4.2): each
//! submodule here is the body of one `JobPayload` variant, independent of
//! how the surrounding worker loop claims and retries jobs.

pub mod classify;
pub mod classify_llm;
pub mod fetch;
pub mod report;

use std::collections::HashMap;

use chrono::Duration;
use regex::Regex;

pub use classify::{classify_tweets, ClassifyOutcome};
pub use classify_llm::{classify_tweets_llm, ClassifyLlmOutcome};
pub use fetch::{fetch_subscriptions, FetchOutcome};
pub use report::{report_profile, ReportOutcome};

/// Every tunable named in spec.md section 6, gathered so a worker binary
/// builds one value from its environment and threads it through every
/// handler instead of each handler reading config independently.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch_batch_size: i64,
    pub fetch_cooldown: Duration,

    pub classify_min_tweets: usize,
    pub classify_tag_min_tweets: usize,
    pub classify_candidate_cap: i64,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    /// How far back the routing cache rebuild looks for samples. Not
    /// named in spec.md's config list; supplements it the same way the
    /// cache rebuild's own `SAMPLE_CAP` does.
    pub routing_window_days: u32,

    pub llm_chunk_size: usize,
    pub llm_max_attempts: u32,
    pub llm_retry_backoff: Duration,
    /// Upper bound on chunks dispatched to the classifier concurrently
    /// within one `classify-tweets-llm` job (spec.md section 5,
    /// `CLASSIFY_CONCURRENCY`).
    pub classify_concurrency: usize,
    pub ai_lock_ttl: Duration,
    pub allowed_tags: Vec<String>,
    pub tag_aliases: HashMap<String, String>,
    pub content_risk_patterns: Vec<Regex>,

    pub report_cluster_threshold: f32,
    pub report_cross_tag_bump: f32,
    pub mid_triage_chunk_size: usize,
    /// Fallback cap used when a report profile doesn't carry its own
    /// `ai_filter_max_keep_per_chunk` override.
    pub mid_triage_max_keep_per_chunk: usize,
    /// Upper bound on mid-tier chunks judged concurrently within one
    /// report run (spec.md section 5, `REPORT_MID_TRIAGE_CONCURRENCY`).
    pub report_mid_triage_concurrency: usize,
    /// Items bundled per delivered notification part; the notifier itself
    /// has no concept of pagination (spec.md section 6).
    pub notify_items_per_message: usize,
}

impl PipelineConfig {
    pub fn cache_build_config(&self) -> crate::routing::CacheBuildConfig {
        crate::routing::CacheBuildConfig {
            model: self.embedding_model.clone(),
            dimensions: self.embedding_dimensions,
            window_days: self.routing_window_days,
        }
    }
}
