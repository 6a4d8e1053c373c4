//! Trait abstractions: storage and external collaborators.

pub mod external;
pub mod store;

pub use external::{EmbeddingProvider, LlmClassifier, Notifier, TimelineFetcher};
pub use store::{
    AiRunStore, InsightStore, InsightWithPost, JobStore, LockStore, NotificationConfigStore,
    PostEmbeddingStore, PostStore, ReportStore, RoutingCacheStore, Store, SubscriptionStore,
};
