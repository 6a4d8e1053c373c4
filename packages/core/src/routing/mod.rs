//! The routing engine: rule-based pre-filter, embedding-based tag
//! router, and LLM-dispatch batch planning (spec.md section 4.4).

pub mod cache_builder;
pub mod dispatch;
pub mod engine;
pub mod text;
pub mod thresholds;

pub use cache_builder::{rebuild_routing_cache, CacheBuildConfig, HIGH_IMPORTANCE, PRIMARY_MIN, SUPPLEMENT_IMPORTANCE};
pub use dispatch::{plan_batches_for_tag, DispatchBatch, DEFAULT_TAG_MIN_TWEETS, DISPATCH_BATCH_SIZE};
pub use engine::{route_embedding, RoutingDecision, ThresholdOverrides, UNROUTED_TAG};
pub use text::{normalize_embedding_text, rule_filter, text_hash, RuleDecision, RuleDropReason};
pub use thresholds::{adapt_thresholds, score_stats, ScoreStats, MIN_SAMPLE_COUNT_FOR_ADAPTATION};
