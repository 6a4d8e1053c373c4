use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use triage_core::traits::AiRunStore;
use triage_core::types::{AiRun, AiRunKind, AiRunStatus};
use triage_core::{Job, JobPayload, JobStatus, JobStore, Result};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    payload: serde_json::Value,
    status: String,
    scheduled_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
    locked_by: Option<String>,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn job_status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn job_status_from_str(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

impl TryFrom<JobRow> for Job {
    type Error = triage_core::TriageError;

    fn try_from(row: JobRow) -> Result<Self> {
        let payload: JobPayload = serde_json::from_value(row.payload)?;
        Ok(Job {
            id: row.id,
            payload,
            status: job_status_from_str(&row.status),
            scheduled_at: row.scheduled_at,
            locked_at: row.locked_at,
            locked_by: row.locked_by,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert_job(&self, job: &Job) -> Result<Job> {
        let payload = serde_json::to_value(&job.payload)?;
        let row = sqlx::query_as::<_, JobRow>(
            "INSERT INTO jobs (
                id, payload, status, scheduled_at, locked_at, locked_by, attempts,
                max_attempts, last_error, created_at, updated_at
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
             RETURNING *",
        )
        .bind(job.id)
        .bind(payload)
        .bind(job_status_to_str(job.status))
        .bind(job.scheduled_at)
        .bind(job.locked_at)
        .bind(&job.locked_by)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        row.try_into()
    }

    async fn find_non_terminal_by_type(&self, job_type: &str) -> Result<Option<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status IN ('pending', 'running') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        for row in rows {
            let job: Job = row.try_into()?;
            if job.job_type() == job_type {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn reserve_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let candidate: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM jobs
             WHERE status = 'pending' AND scheduled_at <= $1
             ORDER BY scheduled_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?;

        let Some((id,)) = candidate else {
            tx.commit().await.map_err(storage_err)?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs SET
                status = 'running', locked_at = $2, locked_by = $3, attempts = attempts + 1, updated_at = $2
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(now)
        .bind(worker_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(Some(row.try_into()?))
    }

    async fn mark_complete(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', updated_at = $2, last_error = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET
                last_error = $2,
                status = CASE WHEN attempts < max_attempts THEN 'pending' ELSE 'failed' END,
                scheduled_at = CASE WHEN attempts < max_attempts THEN $3 ELSE scheduled_at END,
                locked_at = NULL,
                locked_by = NULL,
                updated_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(now + retry_delay)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn requeue(&self, id: Uuid, delay: Duration, revert_attempt: bool, now: DateTime<Utc>) -> Result<()> {
        if revert_attempt {
            sqlx::query(
                "UPDATE jobs SET
                    status = 'pending', scheduled_at = $2, locked_at = NULL, locked_by = NULL,
                    attempts = GREATEST(attempts - 1, 0), updated_at = $3
                 WHERE id = $1",
            )
            .bind(id)
            .bind(now + delay)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        } else {
            sqlx::query(
                "UPDATE jobs SET
                    status = 'pending', scheduled_at = $2, locked_at = NULL, locked_by = NULL, updated_at = $3
                 WHERE id = $1",
            )
            .bind(id)
            .bind(now + delay)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn sweep_stale_running(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'completed', updated_at = $2
             WHERE status = 'running' AND locked_at < $1",
        )
        .bind(cutoff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn heartbeat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET locked_at = $2, updated_at = $2 WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }
}

fn ai_run_kind_to_str(kind: AiRunKind) -> &'static str {
    match kind {
        AiRunKind::Classify => "classify",
        AiRunKind::Report => "report",
    }
}

fn ai_run_status_to_str(status: AiRunStatus) -> &'static str {
    match status {
        AiRunStatus::Running => "running",
        AiRunStatus::Completed => "completed",
        AiRunStatus::Failed => "failed",
    }
}

#[async_trait]
impl AiRunStore for PgStore {
    async fn insert_ai_run(&self, run: &AiRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_runs (id, job_id, kind, status, detail, started_at, completed_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(run.id)
        .bind(run.job_id)
        .bind(ai_run_kind_to_str(run.kind))
        .bind(ai_run_status_to_str(run.status))
        .bind(&run.detail)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn update_ai_run(&self, run: &AiRun) -> Result<()> {
        sqlx::query(
            "UPDATE ai_runs SET status = $2, detail = $3, completed_at = $4 WHERE id = $1",
        )
        .bind(run.id)
        .bind(ai_run_status_to_str(run.status))
        .bind(&run.detail)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
