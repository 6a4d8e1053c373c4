use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::{AbandonReason, Post, PostStore, Result, RoutingStatus};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct PostRow {
    id: Uuid,
    external_id: String,
    subscription_id: Uuid,
    author_handle: String,
    text: String,
    lang: Option<String>,
    source_timestamp: DateTime<Utc>,
    raw_metadata: serde_json::Value,
    routing_status: String,
    routing_tag: Option<String>,
    routing_score: Option<f32>,
    routing_margin: Option<f32>,
    routing_reason: Option<String>,
    routed_at: Option<DateTime<Utc>>,
    llm_queued_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    abandoned_at: Option<DateTime<Utc>>,
    abandon_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) fn routing_status_to_str(status: RoutingStatus) -> &'static str {
    match status {
        RoutingStatus::Pending => "pending",
        RoutingStatus::Routed => "routed",
        RoutingStatus::LlmQueued => "llm_queued",
        RoutingStatus::Ignored => "ignored",
        RoutingStatus::AutoHigh => "auto_high",
        RoutingStatus::Completed => "completed",
    }
}

pub(crate) fn routing_status_from_str(s: &str) -> RoutingStatus {
    match s {
        "routed" => RoutingStatus::Routed,
        "llm_queued" => RoutingStatus::LlmQueued,
        "ignored" => RoutingStatus::Ignored,
        "auto_high" => RoutingStatus::AutoHigh,
        "completed" => RoutingStatus::Completed,
        _ => RoutingStatus::Pending,
    }
}

pub(crate) fn abandon_reason_to_str(reason: AbandonReason) -> &'static str {
    match reason {
        AbandonReason::ContentRisk => "content-risk",
        AbandonReason::MaxRetries => "max-retries",
    }
}

pub(crate) fn abandon_reason_from_str(s: &str) -> AbandonReason {
    match s {
        "max-retries" => AbandonReason::MaxRetries,
        _ => AbandonReason::ContentRisk,
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            external_id: row.external_id,
            subscription_id: row.subscription_id,
            author_handle: row.author_handle,
            text: row.text,
            lang: row.lang,
            source_timestamp: row.source_timestamp,
            raw_metadata: row.raw_metadata,
            routing_status: routing_status_from_str(&row.routing_status),
            routing_tag: row.routing_tag,
            routing_score: row.routing_score,
            routing_margin: row.routing_margin,
            routing_reason: row.routing_reason,
            routed_at: row.routed_at,
            llm_queued_at: row.llm_queued_at,
            processed_at: row.processed_at,
            abandoned_at: row.abandoned_at,
            abandon_reason: row.abandon_reason.as_deref().map(abandon_reason_from_str),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn upsert_post(&self, post: &Post) -> Result<Post> {
        let row = sqlx::query_as::<_, PostRow>(
            "INSERT INTO posts (
                id, external_id, subscription_id, author_handle, text, lang, source_timestamp,
                raw_metadata, routing_status, routing_tag, routing_score, routing_margin,
                routing_reason, routed_at, llm_queued_at, processed_at, abandoned_at,
                abandon_reason, created_at, updated_at
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)
             ON CONFLICT (external_id) DO UPDATE SET updated_at = EXCLUDED.updated_at
             RETURNING *",
        )
        .bind(post.id)
        .bind(&post.external_id)
        .bind(post.subscription_id)
        .bind(&post.author_handle)
        .bind(&post.text)
        .bind(&post.lang)
        .bind(post.source_timestamp)
        .bind(&post.raw_metadata)
        .bind(routing_status_to_str(post.routing_status))
        .bind(&post.routing_tag)
        .bind(post.routing_score)
        .bind(post.routing_margin)
        .bind(&post.routing_reason)
        .bind(post.routed_at)
        .bind(post.llm_queued_at)
        .bind(post.processed_at)
        .bind(post.abandoned_at)
        .bind(post.abandon_reason.map(abandon_reason_to_str))
        .bind(post.created_at)
        .bind(post.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.into())
    }

    async fn get_post_by_external_id(&self, external_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>("SELECT * FROM posts WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>("SELECT * FROM posts WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_pending_posts(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            "SELECT * FROM posts WHERE routing_status = 'pending' ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_routed_by_tag(&self, tag: &str, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            "SELECT * FROM posts WHERE routing_status = 'routed' AND routing_tag = $1
             ORDER BY routed_at ASC LIMIT $2",
        )
        .bind(tag)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_routed_by_tag(&self, tag: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posts WHERE routing_status = 'routed' AND routing_tag = $1",
        )
        .bind(tag)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count)
    }

    async fn bulk_update_routing(&self, posts: &[Post]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for post in posts {
            sqlx::query(
                "UPDATE posts SET
                    routing_status = $2, routing_tag = $3, routing_score = $4, routing_margin = $5,
                    routing_reason = $6, routed_at = $7, llm_queued_at = $8, processed_at = $9,
                    abandoned_at = $10, abandon_reason = $11, updated_at = $12
                 WHERE id = $1",
            )
            .bind(post.id)
            .bind(routing_status_to_str(post.routing_status))
            .bind(&post.routing_tag)
            .bind(post.routing_score)
            .bind(post.routing_margin)
            .bind(&post.routing_reason)
            .bind(post.routed_at)
            .bind(post.llm_queued_at)
            .bind(post.processed_at)
            .bind(post.abandoned_at)
            .bind(post.abandon_reason.map(abandon_reason_to_str))
            .bind(post.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn claim_for_llm_dispatch(&self, ids: &[Uuid], now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE posts SET routing_status = 'llm_queued', llm_queued_at = $2, updated_at = $2
             WHERE id = ANY($1) AND routing_status = 'routed' AND llm_queued_at IS NULL
             RETURNING id",
        )
        .bind(ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
