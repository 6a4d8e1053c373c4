//! Mock external-collaborator implementations for fast unit tests.
//!
//! These return deterministic, configurable responses so pipeline tests
//! never make real HTTP/LLM calls.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::traits::external::{EmbeddingProvider, LlmBatchOutcome, LlmClassification, LlmClassifier, Notifier, TimelineFetcher};
use crate::types::post::FetchedPost;
use crate::types::AbandonReason;

/// Returns a fixed list of posts per handle, configured with `with_posts`.
#[derive(Default)]
pub struct MockFetcher {
    posts: Arc<RwLock<HashMap<String, Vec<FetchedPost>>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, handle: impl Into<String>, posts: Vec<FetchedPost>) -> Self {
        self.posts.write().unwrap().insert(handle.into(), posts);
        self
    }
}

#[async_trait]
impl TimelineFetcher for MockFetcher {
    async fn fetch(&self, handle: &str) -> Result<Vec<FetchedPost>> {
        Ok(self.posts.read().unwrap().get(handle).cloned().unwrap_or_default())
    }
}

/// Generates deterministic embeddings from a SHA-256 hash of the input
/// text, so identical text always produces an identical vector without a
/// real embedding model.
pub struct MockEmbedder {
    model: String,
    dimensions: usize,
    calls: Arc<RwLock<usize>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: "mock-embed-v1".to_string(),
            dimensions,
            calls: Arc::new(RwLock::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.read().unwrap()
    }

    fn deterministic_vector(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();
        (0..self.dimensions)
            .map(|i| (hash[i % hash.len()] as f32 / 127.5) - 1.0)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        *self.calls.write().unwrap() += 1;
        Ok(texts.iter().map(|t| self.deterministic_vector(t)).collect())
    }
}

/// Returns a configurable default classification for every post unless a
/// per-external-id override is registered.
#[derive(Default)]
pub struct MockLlmClassifier {
    overrides: Arc<RwLock<HashMap<String, LlmClassification>>>,
    content_risk: Arc<RwLock<bool>>,
    max_retries_exhausted: Arc<RwLock<bool>>,
}

impl MockLlmClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classification(self, external_id: impl Into<String>, classification: LlmClassification) -> Self {
        self.overrides.write().unwrap().insert(external_id.into(), classification);
        self
    }

    pub fn with_content_risk(self) -> Self {
        *self.content_risk.write().unwrap() = true;
        self
    }

    /// Simulates every retry attempt failing for an unrelated (transient)
    /// reason, as if a real classifier's internal retry loop gave up.
    pub fn with_max_retries_exhausted(self) -> Self {
        *self.max_retries_exhausted.write().unwrap() = true;
        self
    }
}

#[async_trait]
impl LlmClassifier for MockLlmClassifier {
    async fn classify_batch(
        &self,
        posts: &[(String, String)],
        _routing_tag: Option<&str>,
    ) -> Result<LlmBatchOutcome> {
        if *self.content_risk.read().unwrap() {
            return Ok(LlmBatchOutcome::Abandoned(AbandonReason::ContentRisk, "mock content risk".to_string()));
        }
        if *self.max_retries_exhausted.read().unwrap() {
            return Ok(LlmBatchOutcome::Abandoned(AbandonReason::MaxRetries, "mock transient failure".to_string()));
        }
        let overrides = self.overrides.read().unwrap();
        let items = posts
            .iter()
            .map(|(id, text)| {
                overrides.get(id).cloned().unwrap_or_else(|| LlmClassification {
                    external_id: id.clone(),
                    verdict: "watch".to_string(),
                    summary: Some(text.chars().take(50).collect()),
                    importance: Some(2),
                    tags: vec!["other".to_string()],
                    suggestion: None,
                })
            })
            .collect();
        Ok(LlmBatchOutcome::Classified(items))
    }

    async fn judge_keep(&self, _prompt: &str, items: &[(String, String)]) -> Result<Vec<String>> {
        Ok(items.iter().map(|(id, _)| id.clone()).collect())
    }
}

/// Records every delivered notification for assertions.
#[derive(Default)]
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<(String, String)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, target: &str, markdown: &str) -> Result<()> {
        self.sent.write().unwrap().push((target.to_string(), markdown.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed_batch(&["hello".to_string()]).await.unwrap();
        let b = embedder.embed_batch(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.call_count(), 2);
    }

    #[tokio::test]
    async fn mock_notifier_records_sends() {
        let notifier = MockNotifier::new();
        notifier.notify("chat-1", "hello").await.unwrap();
        assert_eq!(notifier.sent(), vec![("chat-1".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn mock_classifier_synthesizes_defaults_for_unregistered_posts() {
        let classifier = MockLlmClassifier::new();
        let outcome = classifier
            .classify_batch(&[("ext-1".to_string(), "some text".to_string())], None)
            .await
            .unwrap();
        match outcome {
            LlmBatchOutcome::Classified(items) => assert_eq!(items[0].external_id, "ext-1"),
            _ => panic!("expected classified outcome"),
        }
    }
}
