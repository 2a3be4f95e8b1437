//! Subscribe, unsubscribe and file feeds into folders.

use crate::api::{ApiOperation, RequestDispatcher};
use crate::error::ReaderError;
use crate::storage::RemoteSubscription;
use crate::util::{feed_stream_id, feed_url_from_stream_id, label_name, label_tag, validate_feed_url};
use serde::Deserialize;
use std::sync::Arc;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickAddResponse {
    #[serde(default)]
    num_results: Option<u32>,
    #[serde(default)]
    stream_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    subscriptions: Vec<SubscriptionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    id: String,
    #[serde(default)]
    label: Option<String>,
}

impl SubscriptionEntry {
    fn into_remote(self) -> Option<RemoteSubscription> {
        let feed_url = match self.url.filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => feed_url_from_stream_id(&self.id)?.to_string(),
        };
        let labels = self
            .categories
            .into_iter()
            .filter_map(|c| c.label.or_else(|| label_name(&c.id).map(str::to_owned)))
            .collect();

        Some(RemoteSubscription {
            title: if self.title.is_empty() {
                feed_url.clone()
            } else {
                self.title
            },
            feed_url,
            html_url: self.html_url.filter(|u| !u.is_empty()),
            labels,
        })
    }
}

// ============================================================================
// Service
// ============================================================================

/// Subscription management on the remote service.
///
/// Every failure of a feed-specific call, including local URL validation,
/// is wrapped in [`ReaderError::Subscription`] carrying the feed URL.
pub struct SubscriptionService {
    dispatcher: Arc<RequestDispatcher>,
}

impl SubscriptionService {
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Subscribes to `feed_url` and returns the feed URL the service filed
    /// it under. Subscribing to an already subscribed feed succeeds.
    pub async fn subscribe(&self, feed_url: &str) -> Result<String, ReaderError> {
        let feed_url = feed_url.trim();
        self.subscribe_inner(feed_url)
            .await
            .map_err(|e| ReaderError::subscription(feed_url, e))
    }

    async fn subscribe_inner(&self, feed_url: &str) -> Result<String, ReaderError> {
        validate_feed_url(feed_url)?;

        let op = ApiOperation::post("subscribe", "subscription/quickadd").form("quickadd", feed_url);
        let response = self.dispatcher.send(&op).await?;

        // Some servers answer with plain "OK"; only a JSON body can report failure
        let Ok(added) = response.json::<QuickAddResponse>() else {
            return Ok(feed_url.to_string());
        };
        if added.num_results == Some(0) {
            let reason = added
                .error
                .unwrap_or_else(|| "service found no feed at this address".to_string());
            return Err(ReaderError::InvalidResponse(reason));
        }

        let canonical = added
            .stream_id
            .as_deref()
            .and_then(feed_url_from_stream_id)
            .unwrap_or(feed_url)
            .to_string();
        tracing::info!(feed = %canonical, "Subscribed");
        Ok(canonical)
    }

    /// Removes the subscription for `feed_url`.
    pub async fn unsubscribe(&self, feed_url: &str) -> Result<(), ReaderError> {
        let feed_url = feed_url.trim();
        let result = async {
            validate_feed_url(feed_url)?;
            let op = ApiOperation::post("unsubscribe", "subscription/edit")
                .form("ac", "unsubscribe")
                .form("s", feed_stream_id(feed_url));
            self.dispatcher.send(&op).await
        }
        .await;

        match result {
            Ok(_) => {
                tracing::info!(feed = %feed_url, "Unsubscribed");
                Ok(())
            }
            Err(e) => Err(ReaderError::subscription(feed_url, e)),
        }
    }

    /// Files the feed under folder `name` (`add = true`) or removes it from
    /// that folder. Nested names such as `Tech/Rust` are passed through.
    pub async fn set_folder_name(
        &self,
        name: &str,
        feed_url: &str,
        add: bool,
    ) -> Result<(), ReaderError> {
        let feed_url = feed_url.trim();
        let result = async {
            let tag = label_tag(name)
                .ok_or_else(|| ReaderError::InvalidRequest("folder name is empty".into()))?;
            validate_feed_url(feed_url)?;

            let op = ApiOperation::post("set folder", "subscription/edit")
                .form("ac", "edit")
                .form("s", feed_stream_id(feed_url))
                .form(if add { "a" } else { "r" }, tag);
            self.dispatcher.send(&op).await
        }
        .await;

        match result {
            Ok(_) => {
                tracing::info!(feed = %feed_url, folder = %name.trim(), add, "Folder label updated");
                Ok(())
            }
            Err(e) => Err(ReaderError::subscription(feed_url, e)),
        }
    }

    /// Fetches the full remote subscription list.
    pub async fn list_subscriptions(&self) -> Result<Vec<RemoteSubscription>, ReaderError> {
        let op = ApiOperation::get("list subscriptions", "subscription/list").query("output", "json");
        let response = self.dispatcher.send(&op).await?;
        parse_subscription_list(&response.body)
    }
}

fn parse_subscription_list(body: &[u8]) -> Result<Vec<RemoteSubscription>, ReaderError> {
    let list: SubscriptionList = serde_json::from_slice(body)
        .map_err(|e| ReaderError::InvalidResponse(format!("subscription list: {}", e)))?;

    let total = list.subscriptions.len();
    let subscriptions: Vec<RemoteSubscription> = list
        .subscriptions
        .into_iter()
        .filter_map(SubscriptionEntry::into_remote)
        .collect();
    if subscriptions.len() < total {
        tracing::debug!(
            skipped = total - subscriptions.len(),
            "Skipped subscriptions without a feed URL"
        );
    }
    Ok(subscriptions)
}
