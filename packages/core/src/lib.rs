//! # Triage Core
//!
//! Domain-agnostic post triage and digest engine: the data model, storage
//! traits, and pure algorithms shared by the triage pipeline, independent
//! of any one backing store or external service.
//!
//! ## Pipeline
//!
//! ```text
//! FETCH -> RULE FILTER -> EMBEDDING ROUTE -> (LLM CLASSIFY) -> REPORT
//!
//! 1. Subscriptions are fetched by an external TimelineFetcher -> Post rows.
//! 2. routing::rule_filter drops low-signal posts before they cost an embedding.
//! 3. routing::route_embedding scores survivors against RoutingCache centroids,
//!    deciding ignore / auto-high / route-to-tag.
//! 4. routing::dispatch groups routed posts into classify-tweets-llm batches.
//! 5. An LlmClassifier judges each batch -> Insight rows.
//! 6. report::{filters, render} turn a window of Insights into a rendered digest,
//!    optionally clustering survivors first (see `clustering`).
//! ```
//!
//! ## Modules
//!
//! - [`types`] - domain records (Post, Insight, Job, SystemLock, ...)
//! - [`traits`] - storage traits and external-collaborator traits
//! - [`error`] - `TriageError` and the crate's `Result` alias
//! - [`routing`] - rule-based pre-filter, embedding router, dispatch planning
//! - [`clustering`] - greedy cosine-similarity clustering for report mode `cluster`
//! - [`report`] - profile filtering and markdown rendering
//! - [`queue`] - the durable job queue orchestrator
//! - [`lock`] - cross-process mutual exclusion
//! - [`llm`] - LLM response JSON extraction and coercion
//! - [`pipeline`] - job handlers wiring the above into the four job types
//! - [`testing`] - in-memory store and mock external collaborators

pub mod clustering;
pub mod error;
pub mod llm;
pub mod lock;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod routing;
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{Result, TriageError};
pub use llm::{coerce_item, extract_json_object, is_content_risk, RawLlmItem};
pub use lock::LockManager;
pub use pipeline::{
    classify_tweets, classify_tweets_llm, fetch_subscriptions, report_profile, ClassifyLlmOutcome,
    ClassifyOutcome, FetchOutcome, PipelineConfig, ReportOutcome,
};
pub use queue::{EnqueueOptions, EnqueueOutcome, JobQueue};
pub use traits::{
    EmbeddingProvider, InsightStore, JobStore, LlmClassifier, LockStore, Notifier,
    PostEmbeddingStore, PostStore, ReportStore, RoutingCacheStore, Store, SubscriptionStore,
    TimelineFetcher,
};
pub use types::{
    AbandonReason, GroupBy, Insight, Job, JobPayload, JobStatus, Post, PostEmbedding, Report,
    ReportOutline, ReportProfile, RoutingCache, RoutingStatus, Subscription, SubscriptionStatus,
    SystemLock, TagSamples, TagThresholds, Verdict,
};
