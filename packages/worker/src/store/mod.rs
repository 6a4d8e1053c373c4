//! Postgres-backed `Store` implementation, split one file per entity the
//! same way `triage-core`'s `traits::store` and `testing::memory_store`
//! are split. Query/bind/error-mapping idiom follows the extraction
//! package's `PostgresStore`.

mod embeddings;
mod insights;
mod jobs;
mod locks;
pub(crate) mod posts;
mod profiles;
mod reports;
mod routing_cache;
mod subscriptions;

pub use profiles::ReportProfileRow;

use sqlx::PgPool;
use triage_core::{Result, TriageError};

#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn storage_err(e: sqlx::Error) -> TriageError {
    TriageError::Storage(Box::new(e))
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| TriageError::Storage(Box::new(e)))
}
