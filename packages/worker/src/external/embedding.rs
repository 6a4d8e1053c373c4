//! `EmbeddingProvider` backed by `openai-client`'s embeddings endpoint.

use async_trait::async_trait;
use openai_client::OpenAIClient;
use triage_core::{EmbeddingProvider, Result, TriageError};

pub struct OpenAiEmbeddingProvider {
    client: OpenAIClient,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(client: OpenAIClient, model: impl Into<String>, dimensions: usize) -> Self {
        Self { client, model: model.into(), dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.client
            .create_embeddings_batch(&refs, &self.model)
            .await
            .map_err(|e| TriageError::Transient(e.to_string()))
    }
}
