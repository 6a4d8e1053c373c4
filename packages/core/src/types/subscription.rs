//! Tracked-account subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscribed vs. unsubscribed. `unsubscribedAt` is soft-state: nulled on
/// resubscribe rather than being treated as a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
}

/// A tracked social-media account.
///
/// Natural key is `handle`, stored lowercased so look-ups are
/// case-insensitive without relying on a citext column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub handle: String,
    pub status: SubscriptionStatus,
    pub tags: Vec<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(handle: impl Into<String>, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            handle: handle.into().to_lowercase(),
            status: SubscriptionStatus::Subscribed,
            tags,
            last_fetched_at: None,
            unsubscribed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this subscription is due for a fetch given a cooldown window.
    pub fn is_due(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        if self.status != SubscriptionStatus::Subscribed {
            return false;
        }
        match self.last_fetched_at {
            None => true,
            Some(last) => now - last >= cooldown,
        }
    }

    pub fn unsubscribe(&mut self, at: DateTime<Utc>) {
        self.status = SubscriptionStatus::Unsubscribed;
        self.unsubscribed_at = Some(at);
        self.updated_at = at;
    }

    pub fn resubscribe(&mut self, at: DateTime<Utc>) {
        self.status = SubscriptionStatus::Subscribed;
        self.unsubscribed_at = None;
        self.updated_at = at;
    }
}
