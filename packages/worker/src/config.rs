//! Environment-sourced configuration (spec.md section 6; SPEC_FULL.md
//! section 10.3). Mirrors the teacher's `Config::from_env()` convention:
//! required vars fail fast via `anyhow::Context`, optional tunables fall
//! back to the defaults spec.md names.

use std::collections::HashMap;
use std::env;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use regex::Regex;
use triage_core::PipelineConfig;

/// Everything a `triage-worker` process needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai_api_key: String,
    pub timeline_service_url: String,

    pub worker_id: String,
    pub idle_sleep: StdDuration,
    pub sweep_cutoff: Duration,

    pub classify_max_tweets: i64,
    pub classify_max_batches: usize,

    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    pub fetch_cron_schedule: String,
    pub classify_cron_schedule: String,
    pub report_cron_schedule: String,

    pub pipeline: PipelineConfig,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| anyhow::anyhow!("{key} must be valid: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let openai_api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let timeline_service_url =
            env::var("TIMELINE_SERVICE_URL").context("TIMELINE_SERVICE_URL must be set")?;

        let worker_id = env_or("WORKER_ID", &format!("worker-{}", uuid::Uuid::new_v4()));
        let idle_sleep_ms: u64 = env_parsed("IDLE_SLEEP_MS", 2_000)?;

        let fetch_batch_size: i64 = env_parsed("FETCH_BATCH_SIZE", 50)?;
        let fetch_cooldown_hours: i64 = env_parsed("FETCH_COOLDOWN_HOURS", 12)?;
        let classify_min_tweets: i64 = env_parsed("CLASSIFY_MIN_TWEETS", 20)?;
        let classify_tag_min_tweets: i64 = env_parsed("CLASSIFY_TAG_MIN_TWEETS", 10)?;
        let classify_max_tweets: i64 = env_parsed("CLASSIFY_MAX_TWEETS", 1000)?;
        let classify_max_batches: i64 = env_parsed("CLASSIFY_MAX_BATCHES", 100)?;
        let classify_concurrency: i64 = env_parsed("CLASSIFY_CONCURRENCY", 4)?;

        let embedding_model = env_or("EMBEDDING_MODEL", "text-embedding-3-small");
        let embedding_dimensions: usize = env_parsed("EMBEDDING_DIMENSIONS", 1536)?;

        let report_cluster_threshold: f32 = env_parsed("REPORT_CLUSTER_THRESHOLD", 0.86)?;
        let ai_lock_ttl_ms: i64 = env_parsed("AI_LOCK_TTL_MS", 600_000)?;
        let _report_min_importance: u8 = env_parsed("REPORT_MIN_IMPORTANCE", 1)?;
        // REPORT_MID_TRIAGE_ENABLED and REPORT_MIN_IMPORTANCE are read here only to
        // validate their format at startup; the control plane sets the real values
        // per-row on ReportProfile (spec.md section 3), which the worker only reads.
        let _report_mid_triage_enabled: bool = env_parsed("REPORT_MID_TRIAGE_ENABLED", false)?;
        let report_mid_triage_chunk_size: usize = env_parsed("REPORT_MID_TRIAGE_CHUNK_SIZE", 40)?;
        let report_mid_triage_max_keep_per_chunk: usize =
            env_parsed("REPORT_MID_TRIAGE_MAX_KEEP_PER_CHUNK", 8)?;
        let report_mid_triage_concurrency: i64 = env_parsed("REPORT_MID_TRIAGE_CONCURRENCY", 4)?;
        let _report_timezone = env_or("REPORT_TIMEZONE", "UTC");

        let report_cron_schedule = env_or("REPORT_CRON_SCHEDULE", "0 0 9 * * *");
        let fetch_cron_schedule = env_or("FETCH_CRON_SCHEDULE", "0 */30 * * * *");
        let classify_cron_schedule = env_or("CLASSIFY_CRON_SCHEDULE", "0 */10 * * * *");

        let content_risk_patterns = parse_content_risk_patterns()?;

        let pipeline = PipelineConfig {
            fetch_batch_size,
            fetch_cooldown: Duration::hours(fetch_cooldown_hours),
            classify_min_tweets: classify_min_tweets.max(0) as usize,
            classify_tag_min_tweets: classify_tag_min_tweets.max(0) as usize,
            classify_candidate_cap: classify_max_tweets,
            embedding_model: embedding_model.clone(),
            embedding_dimensions,
            routing_window_days: 30,
            llm_chunk_size: 10,
            llm_max_attempts: 3,
            llm_retry_backoff: Duration::milliseconds(1500),
            classify_concurrency: classify_concurrency.max(1) as usize,
            ai_lock_ttl: Duration::milliseconds(ai_lock_ttl_ms),
            allowed_tags: default_allowed_tags(),
            tag_aliases: HashMap::new(),
            content_risk_patterns,
            report_cluster_threshold,
            report_cross_tag_bump: 0.05,
            mid_triage_chunk_size: report_mid_triage_chunk_size,
            mid_triage_max_keep_per_chunk: report_mid_triage_max_keep_per_chunk,
            report_mid_triage_concurrency: report_mid_triage_concurrency.max(1) as usize,
            notify_items_per_message: 5,
        };
        Ok(Self {
            database_url,
            openai_api_key,
            timeline_service_url,
            worker_id,
            idle_sleep: StdDuration::from_millis(idle_sleep_ms),
            sweep_cutoff: Duration::hours(1),
            classify_max_tweets,
            classify_max_batches: classify_max_batches.max(0) as usize,
            chat_model: env_or("CLASSIFY_CHAT_MODEL", "gpt-4o-mini"),
            embedding_model,
            embedding_dimensions,
            fetch_cron_schedule,
            classify_cron_schedule,
            report_cron_schedule,
            pipeline,
        })
    }
}

/// Allowed routing/classification tags. Not named as a single env var in
/// spec.md section 6; operators configure them via `ALLOWED_TAGS` as a
/// comma-separated list, falling back to a sane starter set.
fn default_allowed_tags() -> Vec<String> {
    match env::var("ALLOWED_TAGS") {
        Ok(raw) => raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        Err(_) => vec![
            "policy".to_string(),
            "markets".to_string(),
            "security".to_string(),
            "other".to_string(),
        ],
    }
}

/// `CONTENT_RISK_PATTERNS` is a `;`-separated list of regex patterns
/// (spec.md section 4.5, 7-3). Each must compile; a bad pattern fails
/// startup rather than silently routing around content-risk detection.
fn parse_content_risk_patterns() -> Result<Vec<Regex>> {
    match env::var("CONTENT_RISK_PATTERNS") {
        Ok(raw) => raw
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|p| Regex::new(p).with_context(|| format!("invalid CONTENT_RISK_PATTERNS entry: {p}")))
            .collect(),
        Err(_) => Ok(Vec::new()),
    }
}
