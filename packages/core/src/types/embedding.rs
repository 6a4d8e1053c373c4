//! Post embeddings with freshness tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 1:1 with Post. Stale if the model changed, the dimension changed, or
/// the source text hash no longer matches (spec.md section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEmbedding {
    pub post_id: Uuid,
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
    pub text_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PostEmbedding {
    pub fn new(post_id: Uuid, vector: Vec<f32>, model: impl Into<String>, text_hash: impl Into<String>) -> Self {
        let dimensions = vector.len();
        Self {
            post_id,
            vector,
            model: model.into(),
            dimensions,
            text_hash: text_hash.into(),
            created_at: Utc::now(),
        }
    }

    /// Stale if (model changed) ∨ (dimension changed) ∨ (text-hash differs).
    pub fn is_stale(&self, expected_model: &str, expected_dims: usize, expected_text_hash: &str) -> bool {
        self.model != expected_model
            || self.dimensions != expected_dims
            || self.text_hash != expected_text_hash
    }
}
