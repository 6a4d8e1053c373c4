use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::{Report, ReportOutline, ReportStore, Result};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct ReportRow {
    id: Uuid,
    profile_id: Option<Uuid>,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    headline: String,
    content: String,
    outline: serde_json::Value,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = triage_core::TriageError;

    fn try_from(row: ReportRow) -> Result<Self> {
        let outline: ReportOutline = serde_json::from_value(row.outline)?;
        Ok(Report {
            id: row.id,
            profile_id: row.profile_id,
            period_start: row.period_start,
            period_end: row.period_end,
            headline: row.headline,
            content: row.content,
            outline,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn find_report(&self, profile_id: Uuid, period_end: DateTime<Utc>) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT * FROM reports WHERE profile_id = $1 AND period_end = $2",
        )
        .bind(profile_id)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        let outline = serde_json::to_value(&report.outline)?;
        sqlx::query(
            "INSERT INTO reports (
                id, profile_id, period_start, period_end, headline, content, outline,
                delivered_at, created_at
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(report.id)
        .bind(report.profile_id)
        .bind(report.period_start)
        .bind(report.period_end)
        .bind(&report.headline)
        .bind(&report.content)
        .bind(outline)
        .bind(report.delivered_at)
        .bind(report.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

impl PgStore {
    /// Read-only lookup used by the worker after a `report-profile` job
    /// completes, to fetch the content to deliver.
    pub async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>("SELECT * FROM reports WHERE id = $1")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn mark_report_delivered(&self, report_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE reports SET delivered_at = $2 WHERE id = $1")
            .bind(report_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}
