//! `fetch-subscriptions` job handler (spec.md sections 4.2 and 6).

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::traits::{Store, TimelineFetcher};
use crate::types::Post;

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub subscriptions_fetched: usize,
    pub posts_ingested: usize,
}

/// Fetch due (or explicitly pinned) subscriptions and ingest whatever the
/// upstream fetcher returns. `subscription_ids` pins an explicit subset,
/// bypassing the due-cooldown sweep (the `fetch-subscriptions` payload's
/// `subscription_ids` field).
pub async fn fetch_subscriptions(
    store: &Arc<dyn Store>,
    fetcher: &dyn TimelineFetcher,
    subscription_ids: Option<&[Uuid]>,
    cooldown: Duration,
    batch_size: i64,
) -> Result<FetchOutcome> {
    let now = Utc::now();
    let subs = match subscription_ids {
        Some(ids) => store.list_subscriptions_by_ids(ids).await?,
        None => store.list_due_subscriptions(now, cooldown, batch_size).await?,
    };

    let mut outcome = FetchOutcome { subscriptions_fetched: subs.len(), posts_ingested: 0 };

    for mut sub in subs {
        let fetched = fetcher.fetch(&sub.handle).await?;
        for item in fetched {
            let post = Post::from_fetched(sub.id, item);
            store.upsert_post(&post).await?;
            outcome.posts_ingested += 1;
        }
        sub.last_fetched_at = Some(now);
        sub.updated_at = now;
        store.upsert_subscription(&sub).await?;
    }

    info!(
        subscriptions = outcome.subscriptions_fetched,
        posts = outcome.posts_ingested,
        "fetch-subscriptions complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, MockFetcher};
    use crate::traits::SubscriptionStore;
    use crate::types::post::FetchedPost;
    use crate::types::Subscription;

    fn fetched(external_id: &str) -> FetchedPost {
        FetchedPost {
            external_id: external_id.to_string(),
            created_at: Utc::now(),
            text: "some post text".to_string(),
            lang: Some("en".to_string()),
            author_handle: "acct".to_string(),
            raw_metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn due_subscription_is_fetched_and_posts_ingested() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let sub = Subscription::new("acct", vec!["policy".to_string()]);
        store.upsert_subscription(&sub).await.unwrap();

        let fetcher = MockFetcher::new().with_posts("acct", vec![fetched("e1"), fetched("e2")]);

        let outcome = fetch_subscriptions(&store, &fetcher, None, Duration::hours(12), 10)
            .await
            .unwrap();
        assert_eq!(outcome.subscriptions_fetched, 1);
        assert_eq!(outcome.posts_ingested, 2);

        let reloaded = store.get_subscription_by_handle("acct").await.unwrap().unwrap();
        assert!(reloaded.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn cooled_down_subscription_is_skipped() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let mut sub = Subscription::new("acct", vec![]);
        sub.last_fetched_at = Some(Utc::now());
        store.upsert_subscription(&sub).await.unwrap();

        let fetcher = MockFetcher::new().with_posts("acct", vec![fetched("e1")]);
        let outcome = fetch_subscriptions(&store, &fetcher, None, Duration::hours(12), 10)
            .await
            .unwrap();
        assert_eq!(outcome.subscriptions_fetched, 0);
        assert_eq!(outcome.posts_ingested, 0);
    }

    #[tokio::test]
    async fn explicit_subscription_ids_bypass_cooldown() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let mut sub = Subscription::new("acct", vec![]);
        sub.last_fetched_at = Some(Utc::now());
        store.upsert_subscription(&sub).await.unwrap();
        let id = sub.id;

        let fetcher = MockFetcher::new().with_posts("acct", vec![fetched("e1")]);
        let outcome = fetch_subscriptions(&store, &fetcher, Some(&[id]), Duration::hours(12), 10)
            .await
            .unwrap();
        assert_eq!(outcome.subscriptions_fetched, 1);
        assert_eq!(outcome.posts_ingested, 1);
    }

    #[tokio::test]
    async fn empty_fetch_returns_zero_without_error() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let fetcher = MockFetcher::new();
        let outcome = fetch_subscriptions(&store, &fetcher, None, Duration::hours(12), 10)
            .await
            .unwrap();
        assert_eq!(outcome.subscriptions_fetched, 0);
        assert_eq!(outcome.posts_ingested, 0);
    }
}
