use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use triage_core::{PostEmbedding, PostEmbeddingStore, Result};
use uuid::Uuid;

use super::{storage_err, PgStore};

#[derive(FromRow)]
struct EmbeddingRow {
    post_id: Uuid,
    vector: Vec<f32>,
    model: String,
    dimensions: i32,
    text_hash: String,
    created_at: DateTime<Utc>,
}

impl From<EmbeddingRow> for PostEmbedding {
    fn from(row: EmbeddingRow) -> Self {
        PostEmbedding {
            post_id: row.post_id,
            vector: row.vector,
            model: row.model,
            dimensions: row.dimensions as usize,
            text_hash: row.text_hash,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PostEmbeddingStore for PgStore {
    async fn get_embedding(&self, post_id: Uuid) -> Result<Option<PostEmbedding>> {
        let row = sqlx::query_as::<_, EmbeddingRow>("SELECT * FROM post_embeddings WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn upsert_embedding(&self, embedding: &PostEmbedding) -> Result<()> {
        sqlx::query(
            "INSERT INTO post_embeddings (post_id, vector, model, dimensions, text_hash, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (post_id) DO UPDATE SET
                vector = EXCLUDED.vector,
                model = EXCLUDED.model,
                dimensions = EXCLUDED.dimensions,
                text_hash = EXCLUDED.text_hash,
                created_at = EXCLUDED.created_at",
        )
        .bind(embedding.post_id)
        .bind(&embedding.vector)
        .bind(&embedding.model)
        .bind(embedding.dimensions as i32)
        .bind(&embedding.text_hash)
        .bind(embedding.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
