//! Cross-process mutual-exclusion lock row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per scope (`classify`, `report`, ...).
///
/// Invariant (spec.md section 3): held iff (`locked_by != null` and
/// `expires_at > now`) or the holder is a live running Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLock {
    pub key: String,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Prefix used when a queue job itself is the lock holder
/// (`job:<id>`), so `LockManager` can check the job's liveness.
pub const JOB_HOLDER_PREFIX: &str = "job:";

impl SystemLock {
    pub fn holder_job_id(holder: &str) -> Option<&str> {
        holder.strip_prefix(JOB_HOLDER_PREFIX)
    }

    pub fn job_holder(job_id: impl std::fmt::Display) -> String {
        format!("{JOB_HOLDER_PREFIX}{job_id}")
    }
}
