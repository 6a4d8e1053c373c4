//! Report profiles and notification targets are control-plane-owned
//! (spec.md section 6: "Control plane ... manages ReportProfiles and
//! NotificationConfig"). The worker only ever reads them, so these live
//! as inherent methods on `PgStore` rather than on the `Store` trait —
//! nothing in `triage-core` needs to write a profile.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::traits::NotificationConfigStore;
use triage_core::types::{NotificationConfig, NOTIFICATION_CONFIG_KEY};
use triage_core::{GroupBy, ReportProfile, Result, Verdict};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
pub struct ReportProfileRow {
    id: Uuid,
    name: String,
    enabled: bool,
    cron_schedule: String,
    window_hours: i64,
    timezone: String,
    tag_include: Vec<String>,
    tag_exclude: Vec<String>,
    author_include: Vec<String>,
    author_exclude: Vec<String>,
    min_importance: i16,
    verdict_whitelist: Option<Vec<String>>,
    group_by: String,
    ai_filter_enabled: bool,
    ai_filter_prompt: Option<String>,
    ai_filter_max_keep_per_chunk: i32,
}

fn verdict_from_str(s: &str) -> Verdict {
    match s {
        "watch" => Verdict::Watch,
        "actionable" => Verdict::Actionable,
        _ => Verdict::Ignore,
    }
}

fn group_by_from_str(s: &str) -> GroupBy {
    match s {
        "tag" => GroupBy::Tag,
        "author" => GroupBy::Author,
        _ => GroupBy::Cluster,
    }
}

impl From<ReportProfileRow> for ReportProfile {
    fn from(row: ReportProfileRow) -> Self {
        ReportProfile {
            id: row.id,
            name: row.name,
            enabled: row.enabled,
            cron_schedule: row.cron_schedule,
            window_hours: row.window_hours,
            timezone: row.timezone,
            tag_include: row.tag_include,
            tag_exclude: row.tag_exclude,
            author_include: row.author_include,
            author_exclude: row.author_exclude,
            min_importance: row.min_importance as u8,
            verdict_whitelist: row
                .verdict_whitelist
                .map(|vs| vs.iter().map(|v| verdict_from_str(v)).collect()),
            group_by: group_by_from_str(&row.group_by),
            ai_filter_enabled: row.ai_filter_enabled,
            ai_filter_prompt: row.ai_filter_prompt,
            ai_filter_max_keep_per_chunk: row.ai_filter_max_keep_per_chunk as usize,
        }
    }
}

#[derive(FromRow)]
struct NotificationConfigRow {
    targets: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl From<NotificationConfigRow> for NotificationConfig {
    fn from(row: NotificationConfigRow) -> Self {
        NotificationConfig { targets: row.targets, updated_at: row.updated_at }
    }
}

impl PgStore {
    /// Read-only lookup for the `report-profile` job dispatcher. `None`
    /// means the control plane deleted or never created the profile;
    /// the worker logs and skips the job rather than erroring.
    pub async fn get_report_profile(&self, profile_id: Uuid) -> Result<Option<ReportProfile>> {
        let row = sqlx::query_as::<_, ReportProfileRow>("SELECT * FROM report_profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    /// All `enabled` profiles, for the worker's own `REPORT_CRON_SCHEDULE`
    /// tick (spec.md section 6). Each profile's own `cron_schedule` column
    /// is control-plane metadata describing its intended cadence; this
    /// worker fires every enabled profile on one shared tick and relies on
    /// `report_profile`'s per-`periodEnd` idempotency to make an
    /// off-cadence tick a no-op rather than a duplicate report.
    pub async fn list_enabled_report_profiles(&self) -> Result<Vec<ReportProfile>> {
        let rows = sqlx::query_as::<_, ReportProfileRow>("SELECT * FROM report_profiles WHERE enabled")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delivery targets for a finished report. `NotificationConfig` is a
    /// singleton row today, not per-profile, so `profile_id` is accepted
    /// for interface symmetry but doesn't currently filter anything.
    pub async fn notify_targets(&self, _profile_id: Uuid) -> Result<Vec<String>> {
        Ok(self.load_notification_config().await?.map(|c| c.targets).unwrap_or_default())
    }
}

#[async_trait]
impl NotificationConfigStore for PgStore {
    async fn load_notification_config(&self) -> Result<Option<NotificationConfig>> {
        let row = sqlx::query_as::<_, NotificationConfigRow>(
            "SELECT targets, updated_at FROM notification_config WHERE key = $1",
        )
        .bind(NOTIFICATION_CONFIG_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }
}
