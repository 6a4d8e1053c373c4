//! Audit trail for expensive AI-backed pipeline stages (spec.md section 6
//! persisted-state list: "AiRuns"). One row per `classify-tweets-llm` or
//! `report-profile` job invocation, so an operator can see which jobs
//! actually talked to the model and how they resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiRunKind {
    Classify,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiRunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRun {
    pub id: Uuid,
    pub job_id: Uuid,
    pub kind: AiRunKind,
    pub status: AiRunStatus,
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AiRun {
    pub fn start(job_id: Uuid, kind: AiRunKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            kind,
            status: AiRunStatus::Running,
            detail: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, detail: Option<String>, now: DateTime<Utc>) {
        self.status = AiRunStatus::Completed;
        self.detail = detail;
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, detail: impl Into<String>, now: DateTime<Utc>) {
        self.status = AiRunStatus::Failed;
        self.detail = Some(detail.into());
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_running_with_no_completed_at() {
        let run = AiRun::start(Uuid::new_v4(), AiRunKind::Classify);
        assert_eq!(run.status, AiRunStatus::Running);
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn complete_sets_timestamp_and_detail() {
        let mut run = AiRun::start(Uuid::new_v4(), AiRunKind::Report);
        let now = Utc::now();
        run.complete(Some("3 kept".to_string()), now);
        assert_eq!(run.status, AiRunStatus::Completed);
        assert_eq!(run.completed_at, Some(now));
        assert_eq!(run.detail.as_deref(), Some("3 kept"));
    }

    #[test]
    fn fail_records_reason() {
        let mut run = AiRun::start(Uuid::new_v4(), AiRunKind::Classify);
        let now = Utc::now();
        run.fail("content risk", now);
        assert_eq!(run.status, AiRunStatus::Failed);
        assert_eq!(run.detail.as_deref(), Some("content risk"));
    }
}
