//! Concrete implementations of `triage-core`'s external-collaborator
//! traits, backed by `openai-client` and plain HTTP.

mod classifier;
mod embedding;
mod fetcher;
mod notifier;

pub use classifier::OpenAiLlmClassifier;
pub use embedding::OpenAiEmbeddingProvider;
pub use fetcher::HttpTimelineFetcher;
pub use notifier::HttpNotifier;

use std::sync::Arc;

use triage_core::{EmbeddingProvider, LlmClassifier, Notifier, TimelineFetcher};

/// The four external services a worker process wires into the pipeline.
pub struct Collaborators {
    pub fetcher: Arc<dyn TimelineFetcher>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub classifier: Arc<dyn LlmClassifier>,
    pub notifier: Arc<dyn Notifier>,
}
