use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::{Result, Subscription, SubscriptionStatus, SubscriptionStore};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct SubscriptionRow {
    id: Uuid,
    handle: String,
    status: String,
    tags: Vec<String>,
    last_fetched_at: Option<DateTime<Utc>>,
    unsubscribed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn status_to_str(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Subscribed => "subscribed",
        SubscriptionStatus::Unsubscribed => "unsubscribed",
    }
}

fn status_from_str(s: &str) -> SubscriptionStatus {
    match s {
        "unsubscribed" => SubscriptionStatus::Unsubscribed,
        _ => SubscriptionStatus::Subscribed,
    }
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.id,
            handle: row.handle,
            status: status_from_str(&row.status),
            tags: row.tags,
            last_fetched_at: row.last_fetched_at,
            unsubscribed_at: row.unsubscribed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn upsert_subscription(&self, sub: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (id, handle, status, tags, last_fetched_at, unsubscribed_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (handle) DO UPDATE SET
                status = EXCLUDED.status,
                tags = EXCLUDED.tags,
                last_fetched_at = EXCLUDED.last_fetched_at,
                unsubscribed_at = EXCLUDED.unsubscribed_at,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(sub.id)
        .bind(&sub.handle)
        .bind(status_to_str(sub.status))
        .bind(&sub.tags)
        .bind(sub.last_fetched_at)
        .bind(sub.unsubscribed_at)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_subscription_by_handle(&self, handle: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn list_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<Subscription>> {
        let cutoff = now - cooldown;
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions
             WHERE status = 'subscribed'
               AND (last_fetched_at IS NULL OR last_fetched_at <= $1)
             ORDER BY last_fetched_at ASC NULLS FIRST
             LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_subscriptions_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
