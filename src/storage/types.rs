use chrono::{DateTime, Utc};
use std::sync::Arc;

// ============================================================================
// Local Entities
// ============================================================================

/// A local folder bound to one remote feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: i64,
    /// Display name
    pub name: Arc<str>,
    /// Canonical feed URL identifying the remote subscription
    pub feed_url: String,
    /// Remote folder (label) the feed is filed under
    pub label: Option<String>,
    /// Time of the last successful refresh
    pub last_update: Option<DateTime<Utc>>,
}

impl Folder {
    pub fn new(id: i64, name: impl Into<Arc<str>>, feed_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            feed_url: feed_url.into(),
            label: None,
            last_update: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_last_update(mut self, at: DateTime<Utc>) -> Self {
        self.last_update = Some(at);
        self
    }
}

/// The parts of a local article the sync core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Remote item id (`tag:google.com,2005:reader/item/...`)
    pub guid: String,
    /// Feed the article belongs to
    pub feed_url: String,
    pub read: bool,
    pub starred: bool,
}

impl Article {
    pub fn new(guid: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            feed_url: feed_url.into(),
            read: false,
            starred: false,
        }
    }
}

// ============================================================================
// Remote Payloads
// ============================================================================

/// An item parsed from a stream contents response
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteArticle {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    /// Full content when present, otherwise the summary
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub read: bool,
    pub starred: bool,
}

/// One entry of the remote subscription list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSubscription {
    pub feed_url: String,
    pub title: String,
    pub html_url: Option<String>,
    /// Folder names the feed is filed under
    pub labels: Vec<String>,
}
