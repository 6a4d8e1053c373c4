//! Ingested posts and their routing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing state machine for a post (spec.md section 3).
///
/// Monotone except for the two explicitly allowed back-edges:
/// `Routed -> LlmQueued` (dispatch claims it) and `Routed -> Ignored`
/// (a retry re-evaluation demotes it). Nothing transitions back to
/// `Pending` automatically; see DESIGN.md "routingStatus reset" decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStatus {
    Pending,
    Routed,
    LlmQueued,
    Ignored,
    AutoHigh,
    Completed,
}

/// Why a post never reached an Insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbandonReason {
    ContentRisk,
    MaxRetries,
}

/// An ingested social-media post. Natural key is `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub external_id: String,
    pub subscription_id: Uuid,
    pub author_handle: String,
    pub text: String,
    pub lang: Option<String>,
    pub source_timestamp: DateTime<Utc>,
    pub raw_metadata: serde_json::Value,

    pub routing_status: RoutingStatus,
    pub routing_tag: Option<String>,
    pub routing_score: Option<f32>,
    pub routing_margin: Option<f32>,
    pub routing_reason: Option<String>,
    pub routed_at: Option<DateTime<Utc>>,
    pub llm_queued_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub abandon_reason: Option<AbandonReason>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an upstream fetcher hands back per post (spec.md section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPost {
    pub external_id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub lang: Option<String>,
    pub author_handle: String,
    pub raw_metadata: serde_json::Value,
}

impl Post {
    pub fn from_fetched(subscription_id: Uuid, fetched: FetchedPost) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: fetched.external_id,
            subscription_id,
            author_handle: fetched.author_handle,
            text: fetched.text,
            lang: fetched.lang,
            source_timestamp: fetched.created_at,
            raw_metadata: fetched.raw_metadata,
            routing_status: RoutingStatus::Pending,
            routing_tag: None,
            routing_score: None,
            routing_margin: None,
            routing_reason: None,
            routed_at: None,
            llm_queued_at: None,
            processed_at: None,
            abandoned_at: None,
            abandon_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this post is still eligible to receive an Insight.
    ///
    /// Invariant: `abandonedAt != null => no Insight created thereafter`.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned_at.is_some()
    }

    pub fn mark_ignored(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.routing_status = RoutingStatus::Ignored;
        self.routing_reason = Some(reason.into());
        self.processed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_auto_high(
        &mut self,
        tag: impl Into<String>,
        score: f32,
        margin: f32,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.routing_status = RoutingStatus::AutoHigh;
        self.routing_tag = Some(tag.into());
        self.routing_score = Some(score);
        self.routing_margin = Some(margin);
        self.routing_reason = Some(reason.into());
        self.processed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_routed(
        &mut self,
        tag: impl Into<String>,
        score: f32,
        margin: f32,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.routing_status = RoutingStatus::Routed;
        self.routing_tag = Some(tag.into());
        self.routing_score = Some(score);
        self.routing_margin = Some(margin);
        self.routing_reason = Some(reason.into());
        self.routed_at = Some(now);
        self.updated_at = now;
    }

    /// Claim this post for LLM dispatch. Caller must apply this only
    /// under the compare-and-set precondition `routed && llm_queued_at
    /// is null` so double-dispatch is impossible (spec.md section 5).
    pub fn mark_llm_queued(&mut self, now: DateTime<Utc>) {
        self.routing_status = RoutingStatus::LlmQueued;
        self.llm_queued_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.routing_status = RoutingStatus::Completed;
        self.processed_at = Some(now);
        self.updated_at = now;
    }

    pub fn abandon(&mut self, reason: AbandonReason, now: DateTime<Utc>) {
        self.abandoned_at = Some(now);
        self.abandon_reason = Some(reason);
        self.updated_at = now;
    }

    /// Manually clear all routing state back to `Pending`, as if the post
    /// had just been ingested. This is the only path back to `Pending`
    /// from `AutoHigh`/`Ignored`/`Completed`/an abandoned post; the
    /// pipeline itself never calls this (see DESIGN.md "routingStatus
    /// reset" decision). Intended for an out-of-band operator action
    /// (e.g. a control-plane "re-analyze" button), not part of any
    /// automated sweep.
    pub fn reset_for_reanalysis(&mut self, now: DateTime<Utc>) {
        self.routing_status = RoutingStatus::Pending;
        self.routing_tag = None;
        self.routing_score = None;
        self.routing_margin = None;
        self.routing_reason = None;
        self.routed_at = None;
        self.llm_queued_at = None;
        self.processed_at = None;
        self.abandoned_at = None;
        self.abandon_reason = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Post {
        Post::from_fetched(
            Uuid::new_v4(),
            FetchedPost {
                external_id: "ext-1".into(),
                created_at: Utc::now(),
                text: "hello".into(),
                lang: Some("en".into()),
                author_handle: "author".into(),
                raw_metadata: serde_json::json!({}),
            },
        )
    }

    #[test]
    fn new_post_is_pending() {
        let p = sample();
        assert_eq!(p.routing_status, RoutingStatus::Pending);
        assert!(!p.is_abandoned());
    }

    #[test]
    fn abandoned_post_is_terminal() {
        let mut p = sample();
        p.abandon(AbandonReason::ContentRisk, Utc::now());
        assert!(p.is_abandoned());
        assert_eq!(p.abandon_reason, Some(AbandonReason::ContentRisk));
    }

    /// State-machine guard: nothing except an explicit
    /// `reset_for_reanalysis` call ever returns a post to `Pending`.
    #[test]
    fn reset_for_reanalysis_is_the_only_path_back_to_pending() {
        let now = Utc::now();

        let mut auto_high = sample();
        auto_high.mark_auto_high("policy", 0.9, 0.2, "embed-high", now);
        assert_ne!(auto_high.routing_status, RoutingStatus::Pending);
        auto_high.reset_for_reanalysis(now);
        assert_eq!(auto_high.routing_status, RoutingStatus::Pending);
        assert!(auto_high.routing_tag.is_none());
        assert!(auto_high.routed_at.is_none());

        let mut abandoned = sample();
        abandoned.mark_routed("policy", 0.8, 0.1, "embed-analyze", now);
        abandoned.abandon(AbandonReason::ContentRisk, now);
        assert!(abandoned.is_abandoned());
        abandoned.reset_for_reanalysis(now);
        assert!(!abandoned.is_abandoned());
        assert_eq!(abandoned.routing_status, RoutingStatus::Pending);
    }
}
