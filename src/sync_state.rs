//! Read and starred flag changes.
//!
//! Changes to one article are applied in call order through a per-article
//! lane; changes to different articles run concurrently.

use crate::api::{ApiOperation, RequestDispatcher};
use crate::error::ReaderError;
use crate::storage::Article;
use crate::util::{feed_stream_id, READ_TAG, STARRED_TAG};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Remote per-article flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleFlag {
    Read,
    Starred,
}

impl ArticleFlag {
    pub fn tag(self) -> &'static str {
        match self {
            ArticleFlag::Read => READ_TAG,
            ArticleFlag::Starred => STARRED_TAG,
        }
    }

    fn operation_name(self, set: bool) -> &'static str {
        match (self, set) {
            (ArticleFlag::Read, true) => "mark read",
            (ArticleFlag::Read, false) => "mark unread",
            (ArticleFlag::Starred, true) => "star",
            (ArticleFlag::Starred, false) => "unstar",
        }
    }
}

type LaneTail = Shared<BoxFuture<'static, ()>>;

/// Last queued change for one article.
struct Lane {
    ticket: u64,
    tail: LaneTail,
}

type Lanes = Arc<Mutex<HashMap<String, Lane>>>;

/// Outcome of a queued flag change.
///
/// The change is already queued when this is returned and runs whether or
/// not the future is awaited.
#[must_use = "the change is sent regardless; await to observe its outcome"]
pub struct FlagChange {
    rx: oneshot::Receiver<Result<(), ReaderError>>,
}

impl Future for FlagChange {
    type Output = Result<(), ReaderError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ReaderError::Cancelled)))
    }
}

/// Pushes flag changes to the service.
pub struct SyncStateService {
    dispatcher: Arc<RequestDispatcher>,
    lanes: Lanes,
    next_ticket: AtomicU64,
}

impl SyncStateService {
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn mark_read(&self, article: &Article, read: bool) -> FlagChange {
        self.set_flag(article, ArticleFlag::Read, read)
    }

    pub fn mark_starred(&self, article: &Article, starred: bool) -> FlagChange {
        self.set_flag(article, ArticleFlag::Starred, starred)
    }

    /// Queues a flag change behind any earlier change to the same article.
    ///
    /// Must be called within a tokio runtime.
    pub fn set_flag(&self, article: &Article, flag: ArticleFlag, value: bool) -> FlagChange {
        let op = ApiOperation::post(flag.operation_name(value), "edit-tag")
            .form("i", article.guid.as_str())
            .form("s", feed_stream_id(&article.feed_url))
            .form(if value { "a" } else { "r" }, flag.tag());

        let (tx, rx) = oneshot::channel();
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let previous = lanes.get(&article.guid).map(|lane| lane.tail.clone());

        let dispatcher = Arc::clone(&self.dispatcher);
        let lane_map = Arc::clone(&self.lanes);
        let guid = article.guid.clone();
        let change = async move {
            if let Some(previous) = previous {
                previous.await;
            }
            let result = dispatcher.send(&op).await.map(|_| ());
            if let Err(e) = &result {
                tracing::warn!(item = %guid, change = op.name, error = %e, "Flag change failed");
            }
            // Caller may have dropped the FlagChange
            let _ = tx.send(result);

            let mut lanes = lane_map.lock().unwrap_or_else(PoisonError::into_inner);
            if lanes.get(&guid).is_some_and(|lane| lane.ticket == ticket) {
                lanes.remove(&guid);
            }
        }
        .boxed()
        .shared();

        lanes.insert(
            article.guid.clone(),
            Lane {
                ticket,
                tail: change.clone(),
            },
        );
        drop(lanes);

        tokio::spawn(change);
        FlagChange { rx }
    }

    /// Marks every article of a feed read as of now.
    pub async fn mark_all_read(&self, feed_url: &str) -> Result<(), ReaderError> {
        let op = ApiOperation::post("mark all read", "mark-all-as-read")
            .form("s", feed_stream_id(feed_url))
            .form("ts", Utc::now().timestamp_micros().to_string());
        self.dispatcher.send(&op).await?;
        tracing::info!(feed = %feed_url.trim(), "Marked all articles read");
        Ok(())
    }

    /// Number of articles with changes still queued or in flight.
    pub fn pending_articles(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
