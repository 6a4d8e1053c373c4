//! Domain-agnostic data types for the triage engine.

pub mod ai_run;
pub mod embedding;
pub mod insight;
pub mod job;
pub mod lock;
pub mod notification_config;
pub mod post;
pub mod report;
pub mod routing_cache;
pub mod subscription;

pub use ai_run::{AiRun, AiRunKind, AiRunStatus};
pub use embedding::PostEmbedding;
pub use insight::{Insight, Verdict};
pub use job::{Job, JobPayload, JobStatus};
pub use lock::SystemLock;
pub use notification_config::{NotificationConfig, NOTIFICATION_CONFIG_KEY};
pub use post::{AbandonReason, Post, RoutingStatus};
pub use report::{GroupBy, Report, ReportOutline, ReportProfile};
pub use routing_cache::{RoutingCache, TagSamples, TagThresholds};
pub use subscription::{Subscription, SubscriptionStatus};
