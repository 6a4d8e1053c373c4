//! Durable background job model.
//!
//! `JobPayload` is a closed, tagged union rather than an opaque
//! `serde_json::Value` (spec.md section 9, "JSON-everything payloads ->
//! tagged unions"): one variant per job type in spec.md section 4.2.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The four job types this core handles (spec.md section 4.2). A
/// fetcher process may enqueue other job types for unrelated features;
/// the worker logs and skips anything it doesn't recognize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobPayload {
    FetchSubscriptions {
        /// `None` means "all due subscriptions, up to FETCH_BATCH_SIZE".
        subscription_ids: Option<Vec<Uuid>>,
    },
    ClassifyTweets,
    ClassifyTweetsLlm {
        post_ids: Vec<Uuid>,
        tag: String,
    },
    ReportProfile {
        profile_id: Uuid,
        notify: bool,
        window_end: DateTime<Utc>,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::FetchSubscriptions { .. } => "fetch-subscriptions",
            JobPayload::ClassifyTweets => "classify-tweets",
            JobPayload::ClassifyTweetsLlm { .. } => "classify-tweets-llm",
            JobPayload::ReportProfile { .. } => "report-profile",
        }
    }
}

/// A durable job row (spec.md section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(payload: JobPayload, run_at: DateTime<Utc>, max_attempts: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payload,
            status: JobStatus::Pending,
            scheduled_at: run_at,
            locked_at: None,
            locked_by: None,
            attempts: 0,
            max_attempts,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job_type(&self) -> &'static str {
        self.payload.job_type()
    }

    /// Whether this job is in a non-terminal state (used by dedupe-enqueue).
    pub fn is_non_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Running)
    }
}
