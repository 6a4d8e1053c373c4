//! Singleton notification configuration (spec.md section 6 persisted-state
//! list: "NotificationConfig (singleton id)"). Owned by the control plane
//! (external, not specified here); the worker only ever reads it when a
//! `report-profile` job finishes and needs to know where to deliver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed row id, mirroring `RoutingCache`'s singleton-key convention.
pub const NOTIFICATION_CONFIG_KEY: &str = "notification-config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Opaque delivery targets (e.g. webhook URLs, channel ids); the
    /// `Notifier` trait implementation is responsible for interpreting
    /// them.
    pub targets: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationConfig {
    pub fn empty() -> Self {
        Self { targets: Vec::new(), updated_at: Utc::now() }
    }
}
