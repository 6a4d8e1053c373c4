//! Traits for the four external collaborators named in spec.md section 6.
//!
//! These are intentionally thin: the core crate only needs to call them,
//! not own their HTTP/retry/auth details. `triage-worker` supplies
//! concrete implementations (backed by `openai-client` for the embedding
//! and LLM services).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::post::FetchedPost;
use crate::types::AbandonReason;

/// Upstream timeline-fetch collaborator (out of scope per spec.md
/// section 1; specified only at its interface).
#[async_trait]
pub trait TimelineFetcher: Send + Sync {
    async fn fetch(&self, handle: &str) -> Result<Vec<FetchedPost>>;
}

/// Embedding generation, batched per spec.md section 6 ("called in
/// batches of 10").
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// One classified item returned by the LLM for one post in a batch.
#[derive(Debug, Clone)]
pub struct LlmClassification {
    pub external_id: String,
    pub verdict: String,
    pub summary: Option<String>,
    pub importance: Option<i64>,
    pub tags: Vec<String>,
    pub suggestion: Option<String>,
}

/// Outcome of one LLM classification batch call. The classifier
/// implementation owns its own retry loop (spec.md section 4.5, 7-1,
/// 7-3: up to 3 attempts with linear 1.5s-per-attempt backoff), so by the
/// time this reaches the pipeline the batch has already been abandoned
/// or classified — there is no "retry me" outcome left for the caller to
/// act on.
#[derive(Debug, Clone)]
pub enum LlmBatchOutcome {
    Classified(Vec<LlmClassification>),
    /// Abandoned without being classified. `ContentRisk` is non-retryable
    /// (the error matched a configured content-risk pattern on the first
    /// attempt it appeared); `MaxRetries` means every attempt failed for
    /// an unrelated (transient) reason.
    Abandoned(AbandonReason, String),
}

/// LLM chat service, used for both the batched classifier (spec.md
/// section 4.5) and the mid-tier report judge (spec.md section 4.6).
#[async_trait]
pub trait LlmClassifier: Send + Sync {
    /// Classify a chunk of posts. `routing_tag` is the routing tag the
    /// dispatcher grouped this chunk under, if any, so the prompt can
    /// include per-tag contextual hints. Implementations are responsible
    /// for their own call retries; this returns once the batch has
    /// reached a terminal outcome.
    async fn classify_batch(
        &self,
        posts: &[(String, String)], // (external_id, text)
        routing_tag: Option<&str>,
    ) -> Result<LlmBatchOutcome>;

    /// Mid-tier report judge: given a prompt and a chunk of (id, text)
    /// pairs, returns the subset of ids to keep.
    async fn judge_keep(&self, prompt: &str, items: &[(String, String)]) -> Result<Vec<String>>;
}

/// Downstream chat-push collaborator (out of scope per spec.md section 1).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one rendered markdown part to `target`. Callers are
    /// responsible for splitting long content (spec.md section 6).
    async fn notify(&self, target: &str, markdown: &str) -> Result<()>;
}
