use super::{FeedStore, Folder, RemoteArticle, RemoteSubscription};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// In-memory [`FeedStore`].
///
/// An article is new the first time its guid is seen for a feed. Flags of
/// known articles are overwritten with the remote values.
#[derive(Debug, Default)]
pub struct MemoryFeedStore {
    articles: Mutex<HashMap<String, HashMap<String, RemoteArticle>>>,
    subscriptions: Mutex<Vec<RemoteSubscription>>,
    refreshed: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Articles stored for a feed, sorted by guid.
    pub fn articles(&self, feed_url: &str) -> Vec<RemoteArticle> {
        let articles = self.articles.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<RemoteArticle> = articles
            .get(feed_url)
            .map(|by_guid| by_guid.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.guid.cmp(&b.guid));
        list
    }

    /// The subscription list from the last reconciliation.
    pub fn subscriptions(&self) -> Vec<RemoteSubscription> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_refresh(&self, feed_url: &str) -> Option<DateTime<Utc>> {
        self.refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(feed_url)
            .copied()
    }
}

impl FeedStore for MemoryFeedStore {
    fn merge_articles(&self, folder: &Folder, articles: Vec<RemoteArticle>) -> usize {
        let mut all = self.articles.lock().unwrap_or_else(PoisonError::into_inner);
        let known = all.entry(folder.feed_url.clone()).or_default();

        let mut new_count = 0;
        for article in articles {
            match known.get_mut(&article.guid) {
                Some(existing) => {
                    existing.read = article.read;
                    existing.starred = article.starred;
                }
                None => {
                    new_count += 1;
                    known.insert(article.guid.clone(), article);
                }
            }
        }
        new_count
    }

    fn reconcile_subscriptions(&self, subscriptions: Vec<RemoteSubscription>) {
        tracing::debug!(count = subscriptions.len(), "Reconciling subscriptions");
        *self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = subscriptions;
    }

    fn record_refresh(&self, folder: &Folder, at: DateTime<Utc>) {
        self.refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(folder.feed_url.clone(), at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn article(guid: &str, read: bool) -> RemoteArticle {
        RemoteArticle {
            guid: guid.to_string(),
            title: format!("Article {}", guid),
            link: None,
            author: None,
            summary: None,
            published: None,
            read,
            starred: false,
        }
    }

    #[test]
    fn test_merge_counts_only_unseen_guids() {
        let store = MemoryFeedStore::new();
        let folder = Folder::new(1, "Example", "https://example.com/feed.xml");

        assert_eq!(
            store.merge_articles(&folder, vec![article("a", false), article("b", false)]),
            2
        );
        assert_eq!(
            store.merge_articles(&folder, vec![article("b", true), article("c", false)]),
            1
        );

        let stored = store.articles("https://example.com/feed.xml");
        assert_eq!(stored.len(), 3);
        assert!(stored[1].read, "known article takes remote read flag");
    }

    #[test]
    fn test_same_guid_in_different_feeds_is_new_for_each() {
        let store = MemoryFeedStore::new();
        let a = Folder::new(1, "A", "https://a.example.com/feed");
        let b = Folder::new(2, "B", "https://b.example.com/feed");

        assert_eq!(store.merge_articles(&a, vec![article("x", false)]), 1);
        assert_eq!(store.merge_articles(&b, vec![article("x", false)]), 1);
    }

    #[test]
    fn test_reconcile_replaces_subscription_list() {
        let store = MemoryFeedStore::new();
        let sub = RemoteSubscription {
            feed_url: "https://example.com/feed.xml".into(),
            title: "Example".into(),
            html_url: None,
            labels: vec!["Tech".into()],
        };
        store.reconcile_subscriptions(vec![sub.clone()]);
        store.reconcile_subscriptions(vec![sub.clone()]);
        assert_eq!(store.subscriptions(), vec![sub]);
    }
}
