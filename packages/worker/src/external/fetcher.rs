//! `TimelineFetcher` backed by a plain HTTP JSON endpoint. The upstream
//! timeline service itself is out of scope (spec.md section 1); this
//! adapter only needs to agree with it on a wire shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use triage_core::types::post::FetchedPost;
use triage_core::{Result, TimelineFetcher, TriageError};

pub struct HttpTimelineFetcher {
    client: Client,
    base_url: String,
}

impl HttpTimelineFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    posts: Vec<FetchedPost>,
}

#[async_trait]
impl TimelineFetcher for HttpTimelineFetcher {
    async fn fetch(&self, handle: &str) -> Result<Vec<FetchedPost>> {
        let url = format!("{}/timelines/{}", self.base_url.trim_end_matches('/'), handle);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TriageError::Transient(e.to_string()))?
            .error_for_status()
            .map_err(|e| TriageError::Transient(e.to_string()))?
            .json::<TimelineResponse>()
            .await
            .map_err(|e| TriageError::Validation(e.to_string()))?;
        Ok(response.posts)
    }
}
