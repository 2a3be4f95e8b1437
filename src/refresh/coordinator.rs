use super::stream::parse_stream;
use super::NewArticleCounter;
use crate::activity::{ActivityHandle, ActivityLog};
use crate::api::{ApiOperation, RequestDispatcher};
use crate::error::ReaderError;
use crate::storage::{FeedStore, Folder};
use crate::util::{encode_path_segment, feed_stream_id};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One pending feed refresh.
#[derive(Debug, Clone)]
pub struct RefreshJob {
    pub folder: Folder,
    /// Fetch every available article instead of the configured cap
    pub ignore_article_limit: bool,
    pub activity: ActivityHandle,
}

impl RefreshJob {
    pub fn new(folder: Folder, activity: ActivityHandle, ignore_article_limit: bool) -> Self {
        Self {
            folder,
            ignore_article_limit,
            activity,
        }
    }

    /// The stream contents request for this job.
    pub fn operation(&self, article_limit: u32) -> ApiOperation {
        let path = format!(
            "stream/contents/{}",
            encode_path_segment(&feed_stream_id(&self.folder.feed_url))
        );
        let mut op = ApiOperation::get("refresh", path)
            .query("output", "json")
            .query("comments", "false")
            .query("likes", "false");
        if !self.ignore_article_limit {
            op = op.query("n", article_limit.to_string());
        }
        if let Some(last_update) = self.folder.last_update {
            op = op.query("ot", last_update.timestamp().to_string());
        }
        op.query("ck", Utc::now().timestamp_millis().to_string())
    }
}

/// Shared state each spawned refresh task needs.
#[derive(Clone)]
struct RefreshContext {
    dispatcher: Arc<RequestDispatcher>,
    store: Arc<dyn FeedStore>,
    activity_log: Arc<dyn ActivityLog>,
    counter: Arc<NewArticleCounter>,
    article_limit: u32,
}

impl RefreshContext {
    async fn run(self, job: RefreshJob) -> Result<usize, ReaderError> {
        let result = self.fetch(&job).await;
        let line = match &result {
            Ok(new) => format!("{} new articles", new),
            Err(ReaderError::HttpStatus(code)) => format!("Server returned HTTP {}", code),
            Err(e) => e.category().to_string(),
        };
        self.activity_log.append(&job.activity, &line);
        result
    }

    async fn fetch(&self, job: &RefreshJob) -> Result<usize, ReaderError> {
        let started = Utc::now();
        let op = job.operation(self.article_limit);
        let response = self.dispatcher.send(&op).await?;
        self.activity_log.append(
            &job.activity,
            &format!("HTTP {} ({} bytes)", response.status.as_u16(), response.body.len()),
        );

        let articles = parse_stream(&response.body)?;
        self.activity_log
            .append(&job.activity, &format!("{} articles received", articles.len()));

        let received = articles.len();
        let new = self.store.merge_articles(&job.folder, articles);
        let total = self.counter.add(new);
        self.store.record_refresh(&job.folder, started);

        tracing::info!(
            feed = %job.folder.feed_url,
            received,
            new,
            cycle_total = total,
            "Feed refreshed"
        );
        Ok(new)
    }
}

/// Control over one spawned refresh.
pub struct RefreshHandle {
    feed_url: String,
    activity: ActivityHandle,
    activity_log: Arc<dyn ActivityLog>,
    task: JoinHandle<Result<usize, ReaderError>>,
}

impl RefreshHandle {
    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Aborts this refresh only. No effect once it has finished.
    ///
    /// The cancellation is recorded by [`wait`](Self::wait), and only if
    /// the abort actually landed before the refresh completed.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Waits for the refresh and returns the number of new articles.
    pub async fn wait(self) -> Result<usize, ReaderError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                tracing::debug!(feed = %self.feed_url, "Refresh cancelled");
                self.activity_log.append(&self.activity, "Refresh cancelled");
                Err(ReaderError::Cancelled)
            }
            Err(e) => Err(ReaderError::TaskFailed(e.to_string())),
        }
    }
}

/// Outcome for one feed of a batch refresh.
#[derive(Debug)]
pub struct FeedRefreshResult {
    pub feed_url: String,
    pub result: Result<usize, ReaderError>,
}

/// Per-feed outcomes of a batch refresh, in the order the folders were given.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub results: Vec<FeedRefreshResult>,
}

impl RefreshReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FeedRefreshResult> {
        self.results.iter().filter(|r| r.result.is_err())
    }

    /// New articles across all successful feeds.
    pub fn new_articles(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .sum()
    }

    /// Total new articles, or `PartialRefreshFailure` if any feed failed.
    pub fn into_result(self) -> Result<usize, ReaderError> {
        let failed = self.failed().count();
        if failed > 0 {
            return Err(ReaderError::PartialRefreshFailure {
                failed,
                total: self.total(),
            });
        }
        Ok(self.new_articles())
    }
}

/// Spawns feed refreshes and accounts for new articles.
pub struct RefreshCoordinator {
    context: RefreshContext,
}

impl RefreshCoordinator {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        store: Arc<dyn FeedStore>,
        activity_log: Arc<dyn ActivityLog>,
        counter: Arc<NewArticleCounter>,
        article_limit: u32,
    ) -> Self {
        Self {
            context: RefreshContext {
                dispatcher,
                store,
                activity_log,
                counter,
                article_limit,
            },
        }
    }

    pub fn counter(&self) -> &NewArticleCounter {
        &self.context.counter
    }

    /// Starts refreshing one folder in the background.
    ///
    /// Must be called within a tokio runtime.
    pub fn refresh_feed(
        &self,
        folder: Folder,
        activity: ActivityHandle,
        ignore_article_limit: bool,
    ) -> RefreshHandle {
        let feed_url = folder.feed_url.clone();
        let activity_log = Arc::clone(&self.context.activity_log);
        activity_log.append(&activity, "Refresh started");
        tracing::debug!(feed = %feed_url, ignore_article_limit, "Starting refresh");

        let job = RefreshJob::new(folder, activity.clone(), ignore_article_limit);
        let task = tokio::spawn(self.context.clone().run(job));

        RefreshHandle {
            feed_url,
            activity,
            activity_log,
            task,
        }
    }

    /// Starts a sync cycle: resets the counter and refreshes every folder
    /// concurrently. One feed failing does not affect the others.
    pub async fn refresh_all(&self, folders: Vec<Folder>, ignore_article_limit: bool) -> RefreshReport {
        self.context.counter.reset();
        if folders.is_empty() {
            return RefreshReport::default();
        }

        let handles: Vec<RefreshHandle> = folders
            .into_iter()
            .map(|folder| {
                // Display names need not be unique; feed URLs are
                let activity = ActivityHandle::new(folder.feed_url.as_str());
                self.refresh_feed(folder, activity, ignore_article_limit)
            })
            .collect();

        let results = futures::future::join_all(handles.into_iter().map(|handle| async move {
            let feed_url = handle.feed_url.clone();
            FeedRefreshResult {
                feed_url,
                result: handle.wait().await,
            }
        }))
        .await;

        let report = RefreshReport { results };
        let failed = report.failed().count();
        if failed > 0 {
            tracing::warn!(failed, total = report.total(), "Some feeds failed to refresh");
        }
        tracing::info!(
            feeds = report.total(),
            new_articles = report.new_articles(),
            "Refresh cycle complete"
        );
        report
    }
}
