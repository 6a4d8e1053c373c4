//! Report generation configuration and output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::insight::Verdict;

/// How survivors are bucketed for rendering (spec.md section 3/4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Cluster,
    Tag,
    Author,
}

/// Operator-configured report recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProfile {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub cron_schedule: String,
    pub window_hours: i64,
    pub timezone: String,
    pub tag_include: Vec<String>,
    pub tag_exclude: Vec<String>,
    pub author_include: Vec<String>,
    pub author_exclude: Vec<String>,
    pub min_importance: u8,
    pub verdict_whitelist: Option<Vec<Verdict>>,
    pub group_by: GroupBy,
    pub ai_filter_enabled: bool,
    pub ai_filter_prompt: Option<String>,
    pub ai_filter_max_keep_per_chunk: usize,
}

impl ReportProfile {
    pub fn new(name: impl Into<String>, window_hours: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            cron_schedule: "0 9 * * *".to_string(),
            window_hours,
            timezone: "UTC".to_string(),
            tag_include: Vec::new(),
            tag_exclude: Vec::new(),
            author_include: Vec::new(),
            author_exclude: Vec::new(),
            min_importance: 1,
            verdict_whitelist: None,
            group_by: GroupBy::Cluster,
            ai_filter_enabled: false,
            ai_filter_prompt: None,
            ai_filter_max_keep_per_chunk: 8,
        }
    }
}

/// A single rendered section item (one insight, in its bucket).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineItem {
    pub post_id: Uuid,
    pub summary: String,
    pub importance: u8,
    pub tags: Vec<String>,
}

/// A bucket of items (a cluster, a tag group, or an author group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    pub peak_importance: u8,
    pub items: Vec<OutlineItem>,
}

/// Structured outline persisted alongside the rendered markdown, with a
/// `mode` discriminator distinguishing clustered from tag/author grouping
/// (spec.md section 9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReportOutline {
    Clustered { sections: Vec<OutlineSection> },
    Tag { sections: Vec<OutlineSection> },
    Author { sections: Vec<OutlineSection> },
}

/// An emitted report. Append-only; at most one per `(profile_id,
/// period_end)` (spec.md section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub headline: String,
    pub content: String,
    pub outline: ReportOutline,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
