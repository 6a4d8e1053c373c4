//! `Notifier` backed by a webhook POST. Which chat system sits behind the
//! webhook is out of scope (spec.md section 1).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use triage_core::{Notifier, Result, TriageError};

pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, target: &str, markdown: &str) -> Result<()> {
        self.client
            .post(target)
            .json(&json!({ "text": markdown }))
            .send()
            .await
            .map_err(|e| TriageError::Transient(e.to_string()))?
            .error_for_status()
            .map_err(|e| TriageError::Transient(e.to_string()))?;
        Ok(())
    }
}
