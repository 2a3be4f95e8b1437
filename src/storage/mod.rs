//! Folder/Article storage collaborator.
//!
//! Persistence is owned by the embedding application. The sync core only
//! hands it what the service returned and reads back what it needs:
//!
//! - [`FeedStore`] - the contract the core writes through
//! - [`MemoryFeedStore`] - in-process implementation (CLI, tests)
//! - [`types`] - folder, article and remote payload types

mod memory;
pub mod types;

pub use memory::MemoryFeedStore;
pub use types::{Article, Folder, RemoteArticle, RemoteSubscription};

use chrono::{DateTime, Utc};

/// Storage operations the sync core depends on.
///
/// Implementations must be cheap to call from async tasks; anything slow
/// should be queued internally.
pub trait FeedStore: Send + Sync {
    /// Merges fetched articles into `folder` and returns how many were not
    /// previously known. The store alone decides what counts as new.
    fn merge_articles(&self, folder: &Folder, articles: Vec<RemoteArticle>) -> usize;

    /// Reconciles local folders against the full remote subscription list.
    fn reconcile_subscriptions(&self, subscriptions: Vec<RemoteSubscription>);

    /// Records a successful refresh so the next one can ask only for newer items.
    fn record_refresh(&self, _folder: &Folder, _at: DateTime<Utc>) {}
}
