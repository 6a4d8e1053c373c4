use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::traits::store::InsightWithPost;
use triage_core::{Insight, InsightStore, Result, Verdict};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct InsightRow {
    post_id: Uuid,
    external_id: String,
    verdict: String,
    summary: Option<String>,
    importance: Option<i16>,
    tags: Vec<String>,
    suggestion: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn verdict_to_str(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Ignore => "ignore",
        Verdict::Watch => "watch",
        Verdict::Actionable => "actionable",
    }
}

fn verdict_from_str(s: &str) -> Verdict {
    match s {
        "watch" => Verdict::Watch,
        "actionable" => Verdict::Actionable,
        _ => Verdict::Ignore,
    }
}

impl From<InsightRow> for Insight {
    fn from(row: InsightRow) -> Self {
        Insight {
            post_id: row.post_id,
            external_id: row.external_id,
            verdict: verdict_from_str(&row.verdict),
            summary: row.summary,
            importance: row.importance.map(|i| i as u8),
            tags: row.tags,
            suggestion: row.suggestion,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl InsightStore for PgStore {
    async fn upsert_insight(&self, insight: &Insight) -> Result<()> {
        sqlx::query(
            "INSERT INTO insights (post_id, external_id, verdict, summary, importance, tags, suggestion, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
             ON CONFLICT (external_id) DO UPDATE SET
                verdict = EXCLUDED.verdict,
                summary = EXCLUDED.summary,
                importance = EXCLUDED.importance,
                tags = EXCLUDED.tags,
                suggestion = EXCLUDED.suggestion,
                updated_at = EXCLUDED.updated_at
             WHERE insights.verdict IS DISTINCT FROM EXCLUDED.verdict
                OR insights.summary IS DISTINCT FROM EXCLUDED.summary
                OR insights.importance IS DISTINCT FROM EXCLUDED.importance
                OR insights.tags IS DISTINCT FROM EXCLUDED.tags
                OR insights.suggestion IS DISTINCT FROM EXCLUDED.suggestion",
        )
        .bind(insight.post_id)
        .bind(&insight.external_id)
        .bind(verdict_to_str(insight.verdict))
        .bind(&insight.summary)
        .bind(insight.importance.map(|i| i as i16))
        .bind(&insight.tags)
        .bind(&insight.suggestion)
        .bind(insight.created_at)
        .bind(insight.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_insight(&self, external_id: &str) -> Result<Option<Insight>> {
        let row = sqlx::query_as::<_, InsightRow>("SELECT * FROM insights WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn list_insights_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InsightWithPost>> {
        let rows = sqlx::query_as::<_, InsightWithPostRow>(
            "SELECT
                i.post_id AS i_post_id, i.external_id AS i_external_id, i.verdict AS i_verdict,
                i.summary AS i_summary, i.importance AS i_importance, i.tags AS i_tags,
                i.suggestion AS i_suggestion, i.created_at AS i_created_at, i.updated_at AS i_updated_at,
                p.id AS p_id, p.external_id AS p_external_id, p.subscription_id AS p_subscription_id,
                p.author_handle AS p_author_handle, p.text AS p_text, p.lang AS p_lang,
                p.source_timestamp AS p_source_timestamp, p.raw_metadata AS p_raw_metadata,
                p.routing_status AS p_routing_status, p.routing_tag AS p_routing_tag,
                p.routing_score AS p_routing_score, p.routing_margin AS p_routing_margin,
                p.routing_reason AS p_routing_reason, p.routed_at AS p_routed_at,
                p.llm_queued_at AS p_llm_queued_at, p.processed_at AS p_processed_at,
                p.abandoned_at AS p_abandoned_at, p.abandon_reason AS p_abandon_reason,
                p.created_at AS p_created_at, p.updated_at AS p_updated_at
             FROM insights i
             JOIN posts p ON p.id = i.post_id
             WHERE i.verdict != 'ignore' AND p.source_timestamp BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Flat join row for [`InsightStore::list_insights_in_window`]: sqlx has
/// no tuple-of-`FromRow` support for a join, so both sides are aliased
/// into one row and split back apart here.
#[derive(FromRow)]
struct InsightWithPostRow {
    i_post_id: Uuid,
    i_external_id: String,
    i_verdict: String,
    i_summary: Option<String>,
    i_importance: Option<i16>,
    i_tags: Vec<String>,
    i_suggestion: Option<String>,
    i_created_at: DateTime<Utc>,
    i_updated_at: DateTime<Utc>,

    p_id: Uuid,
    p_external_id: String,
    p_subscription_id: Uuid,
    p_author_handle: String,
    p_text: String,
    p_lang: Option<String>,
    p_source_timestamp: DateTime<Utc>,
    p_raw_metadata: serde_json::Value,
    p_routing_status: String,
    p_routing_tag: Option<String>,
    p_routing_score: Option<f32>,
    p_routing_margin: Option<f32>,
    p_routing_reason: Option<String>,
    p_routed_at: Option<DateTime<Utc>>,
    p_llm_queued_at: Option<DateTime<Utc>>,
    p_processed_at: Option<DateTime<Utc>>,
    p_abandoned_at: Option<DateTime<Utc>>,
    p_abandon_reason: Option<String>,
    p_created_at: DateTime<Utc>,
    p_updated_at: DateTime<Utc>,
}

impl From<InsightWithPostRow> for InsightWithPost {
    fn from(row: InsightWithPostRow) -> Self {
        let insight = Insight {
            post_id: row.i_post_id,
            external_id: row.i_external_id,
            verdict: verdict_from_str(&row.i_verdict),
            summary: row.i_summary,
            importance: row.i_importance.map(|i| i as u8),
            tags: row.i_tags,
            suggestion: row.i_suggestion,
            created_at: row.i_created_at,
            updated_at: row.i_updated_at,
        };
        let post = triage_core::Post {
            id: row.p_id,
            external_id: row.p_external_id,
            subscription_id: row.p_subscription_id,
            author_handle: row.p_author_handle,
            text: row.p_text,
            lang: row.p_lang,
            source_timestamp: row.p_source_timestamp,
            raw_metadata: row.p_raw_metadata,
            routing_status: super::posts::routing_status_from_str(&row.p_routing_status),
            routing_tag: row.p_routing_tag,
            routing_score: row.p_routing_score,
            routing_margin: row.p_routing_margin,
            routing_reason: row.p_routing_reason,
            routed_at: row.p_routed_at,
            llm_queued_at: row.p_llm_queued_at,
            processed_at: row.p_processed_at,
            abandoned_at: row.p_abandoned_at,
            abandon_reason: row.p_abandon_reason.as_deref().map(super::posts::abandon_reason_from_str),
            created_at: row.p_created_at,
            updated_at: row.p_updated_at,
        };
        InsightWithPost { insight, post }
    }
}
