//! Singleton `RoutingCache` row, keyed by `ROUTING_CACHE_KEY`. The
//! per-tag sample pools and adaptive thresholds are stored as a single
//! `jsonb` blob (`RoutingCache` already serializes cleanly via serde);
//! `model`/`dimensions`/`window_days` are broken out into real columns
//! so a staleness check never has to round-trip the blob.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::FromRow;
use triage_core::traits::store::InsightWithPost;
use triage_core::types::routing_cache::{TagSamples, TagThresholds, ROUTING_CACHE_KEY};
use triage_core::{Result, RoutingCache, RoutingCacheStore, TriageError, Verdict};
use uuid::Uuid;

use super::posts::{abandon_reason_from_str, routing_status_from_str};
use super::{storage_err, PgStore};

#[derive(FromRow)]
struct RoutingCacheRow {
    model: String,
    dimensions: i32,
    window_days: i32,
    per_tag: serde_json::Value,
    negative_samples: serde_json::Value,
    thresholds: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl RoutingCacheRow {
    fn into_cache(self) -> Result<RoutingCache> {
        let per_tag: IndexMap<String, TagSamples> =
            serde_json::from_value(self.per_tag).map_err(TriageError::from)?;
        let negative_samples: Vec<Vec<f32>> =
            serde_json::from_value(self.negative_samples).map_err(TriageError::from)?;
        let thresholds: IndexMap<String, TagThresholds> =
            serde_json::from_value(self.thresholds).map_err(TriageError::from)?;
        Ok(RoutingCache {
            dimensions: self.dimensions as usize,
            model: self.model,
            window_days: self.window_days as u32,
            per_tag,
            negative_samples,
            thresholds,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl RoutingCacheStore for PgStore {
    async fn load_routing_cache(&self) -> Result<Option<RoutingCache>> {
        let row = sqlx::query_as::<_, RoutingCacheRow>(
            "SELECT model, dimensions, window_days, per_tag, negative_samples, thresholds, updated_at
             FROM routing_cache WHERE key = $1",
        )
        .bind(ROUTING_CACHE_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(RoutingCacheRow::into_cache).transpose()
    }

    async fn save_routing_cache(&self, cache: &RoutingCache) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let existing: Option<(String, i32)> =
            sqlx::query_as("SELECT model, dimensions FROM routing_cache WHERE key = $1 FOR UPDATE")
                .bind(ROUTING_CACHE_KEY)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_err)?;

        if let Some((model, dimensions)) = &existing {
            if model != &cache.model || *dimensions as usize != cache.dimensions {
                return Err(TriageError::Stale(format!(
                    "routing cache model/dimension mismatch: stored {model}/{dimensions} vs {}/{}",
                    cache.model, cache.dimensions
                )));
            }
        }

        let per_tag = serde_json::to_value(&cache.per_tag).map_err(TriageError::from)?;
        let negative_samples = serde_json::to_value(&cache.negative_samples).map_err(TriageError::from)?;
        let thresholds = serde_json::to_value(&cache.thresholds).map_err(TriageError::from)?;

        sqlx::query(
            "INSERT INTO routing_cache (key, model, dimensions, window_days, per_tag, negative_samples, thresholds, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (key) DO UPDATE SET
                model = EXCLUDED.model,
                dimensions = EXCLUDED.dimensions,
                window_days = EXCLUDED.window_days,
                per_tag = EXCLUDED.per_tag,
                negative_samples = EXCLUDED.negative_samples,
                thresholds = EXCLUDED.thresholds,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(ROUTING_CACHE_KEY)
        .bind(&cache.model)
        .bind(cache.dimensions as i32)
        .bind(cache.window_days as i32)
        .bind(per_tag)
        .bind(negative_samples)
        .bind(thresholds)
        .bind(cache.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn distinct_recent_tags(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let rows: Vec<(Vec<String>,)> = sqlx::query_as(
            "SELECT DISTINCT i.tags FROM insights i
             JOIN posts p ON p.id = i.post_id
             WHERE i.verdict != 'ignore' AND p.source_timestamp >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        let mut tags: Vec<String> = rows.into_iter().flat_map(|(t,)| t).collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn list_routing_samples(
        &self,
        tag: &str,
        since: DateTime<Utc>,
        min_importance: u8,
        limit: i64,
    ) -> Result<Vec<InsightWithPost>> {
        let rows = sqlx::query_as::<_, JoinedRow>(
            "SELECT i.post_id AS i_post_id, i.external_id AS i_external_id, i.verdict AS i_verdict,
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
             WHERE i.verdict != 'ignore' AND i.importance >= $1 AND $2 = ANY(i.tags) AND p.source_timestamp >= $3
             ORDER BY p.source_timestamp DESC
             LIMIT $4",
        )
        .bind(min_importance as i16)
        .bind(tag)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_negative_samples(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<InsightWithPost>> {
        let rows = sqlx::query_as::<_, JoinedRow>(
            "SELECT i.post_id AS i_post_id, i.external_id AS i_external_id, i.verdict AS i_verdict,
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
             WHERE i.verdict = 'ignore' AND p.source_timestamp >= $1
             ORDER BY p.source_timestamp DESC
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(FromRow)]
struct JoinedRow {
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

fn verdict_from_str(s: &str) -> Verdict {
    match s {
        "watch" => Verdict::Watch,
        "actionable" => Verdict::Actionable,
        _ => Verdict::Ignore,
    }
}

impl From<JoinedRow> for InsightWithPost {
    fn from(row: JoinedRow) -> Self {
        let insight = triage_core::Insight {
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
            routing_status: routing_status_from_str(&row.p_routing_status),
            routing_tag: row.p_routing_tag,
            routing_score: row.p_routing_score,
            routing_margin: row.p_routing_margin,
            routing_reason: row.p_routing_reason,
            routed_at: row.p_routed_at,
            llm_queued_at: row.p_llm_queued_at,
            processed_at: row.p_processed_at,
            abandoned_at: row.p_abandoned_at,
            abandon_reason: row.p_abandon_reason.as_deref().map(abandon_reason_from_str),
            created_at: row.p_created_at,
            updated_at: row.p_updated_at,
        };
        InsightWithPost { insight, post }
    }
}
