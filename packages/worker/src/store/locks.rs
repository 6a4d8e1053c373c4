use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::{LockStore, Result, SystemLock, TriageError};

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct LockRow {
    key: String,
    locked_by: String,
    locked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<LockRow> for SystemLock {
    fn from(row: LockRow) -> Self {
        SystemLock {
            key: row.key,
            locked_by: row.locked_by,
            locked_at: row.locked_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl LockStore for PgStore {
    async fn get_lock(&self, key: &str) -> Result<Option<SystemLock>> {
        let row = sqlx::query_as::<_, LockRow>("SELECT * FROM system_locks WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn insert_lock(&self, lock: &SystemLock) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO system_locks (key, locked_by, locked_at, expires_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(&lock.key)
        .bind(&lock.locked_by)
        .bind(lock.locked_at)
        .bind(lock.expires_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(TriageError::LockUnavailable {
                scope: lock.key.clone(),
                holder: lock.locked_by.clone(),
            });
        }
        Ok(())
    }

    async fn upsert_lock(&self, lock: &SystemLock, expected_holder: Option<&str>) -> Result<bool> {
        let result = match expected_holder {
            Some(holder) => {
                sqlx::query(
                    "UPDATE system_locks SET locked_by = $2, locked_at = $3, expires_at = $4
                     WHERE key = $1 AND locked_by = $5",
                )
                .bind(&lock.key)
                .bind(&lock.locked_by)
                .bind(lock.locked_at)
                .bind(lock.expires_at)
                .bind(holder)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?
            }
            None => {
                sqlx::query(
                    "INSERT INTO system_locks (key, locked_by, locked_at, expires_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (key) DO UPDATE SET
                        locked_by = EXCLUDED.locked_by,
                        locked_at = EXCLUDED.locked_at,
                        expires_at = EXCLUDED.expires_at",
                )
                .bind(&lock.key)
                .bind(&lock.locked_by)
                .bind(lock.locked_at)
                .bind(lock.expires_at)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn release_lock(&self, key: &str, holder: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM system_locks WHERE key = $1 AND locked_by = $2")
            .bind(key)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }
}
