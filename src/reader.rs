//! Single entry point wiring the sync services together.

use crate::activity::{ActivityHandle, ActivityLog, TracingActivityLog};
use crate::api::RequestDispatcher;
use crate::auth::{AuthSettings, Authenticator, TokenPolicy};
use crate::config::{Config, ConfigError};
use crate::error::ReaderError;
use crate::refresh::{NewArticleCounter, RefreshCoordinator, RefreshHandle, RefreshReport};
use crate::storage::{Article, FeedStore, Folder, RemoteSubscription};
use crate::subscriptions::SubscriptionService;
use crate::sync_state::{FlagChange, SyncStateService};
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;

/// Why the subscription list is being (re)loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The embedding application finished starting up
    ApplicationReady,
    /// Subscriptions were changed locally and should be reconciled
    SubscriptionsChanged,
}

/// The synchronization client.
///
/// Construct one per process and share it by reference or `Arc`. Dropping
/// it stops the token refresh timers.
pub struct Reader {
    auth: Authenticator,
    subscriptions: SubscriptionService,
    sync_state: SyncStateService,
    refresh: RefreshCoordinator,
    store: Arc<dyn FeedStore>,
}

impl Reader {
    /// Wires the services over the given collaborators.
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn FeedStore>,
        activity_log: Arc<dyn ActivityLog>,
    ) -> Result<Self, ConfigError> {
        let api_base = config.api_base()?;
        let auth = Authenticator::new(
            AuthSettings::from_config(config)?,
            TokenPolicy::from_config(config),
            Arc::clone(&transport),
        );
        let dispatcher = Arc::new(RequestDispatcher::new(
            api_base,
            config.client_name.clone(),
            auth.clone(),
            transport,
            Arc::clone(&activity_log),
        ));

        Ok(Self {
            auth,
            subscriptions: SubscriptionService::new(Arc::clone(&dispatcher)),
            sync_state: SyncStateService::new(Arc::clone(&dispatcher)),
            refresh: RefreshCoordinator::new(
                dispatcher,
                Arc::clone(&store),
                activity_log,
                Arc::new(NewArticleCounter::new()),
                config.article_limit,
            ),
            store,
        })
    }

    /// Builds the reqwest transport from `config` and logs activity through `tracing`.
    pub fn from_config(config: &Config, store: Arc<dyn FeedStore>) -> Result<Self, ConfigError> {
        let transport = HttpTransport::build(
            &config.client_name,
            config.request_timeout(),
            config.max_concurrent_requests,
        )
        .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Self::new(config, Arc::new(transport), store, Arc::new(TracingActivityLog))
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Session token present and not known-invalid.
    pub fn is_ready(&self) -> bool {
        self.auth.is_ready()
    }

    pub fn count_of_new_articles(&self) -> usize {
        self.refresh.counter().get()
    }

    pub async fn get_token(&self) -> Result<(), ReaderError> {
        Ok(self.auth.get_token().await?)
    }

    pub fn clear_authentication(&self) {
        self.auth.clear_authentication();
    }

    pub async fn reset_authentication(&self) -> Result<(), ReaderError> {
        Ok(self.auth.reset_authentication().await?)
    }

    pub async fn subscribe(&self, feed_url: &str) -> Result<String, ReaderError> {
        self.subscriptions.subscribe(feed_url).await
    }

    pub async fn unsubscribe(&self, feed_url: &str) -> Result<(), ReaderError> {
        self.subscriptions.unsubscribe(feed_url).await
    }

    pub async fn set_folder_name(
        &self,
        name: &str,
        feed_url: &str,
        add: bool,
    ) -> Result<(), ReaderError> {
        self.subscriptions.set_folder_name(name, feed_url, add).await
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<RemoteSubscription>, ReaderError> {
        self.subscriptions.list_subscriptions().await
    }

    /// Fetches the remote subscription list and reconciles local folders
    /// against it. Returns the number of subscriptions.
    pub async fn load_subscriptions(&self, trigger: SyncTrigger) -> Result<usize, ReaderError> {
        tracing::debug!(?trigger, "Loading subscriptions");
        let subscriptions = self.subscriptions.list_subscriptions().await?;
        let count = subscriptions.len();
        self.store.reconcile_subscriptions(subscriptions);
        tracing::info!(count, ?trigger, "Subscriptions loaded");
        Ok(count)
    }

    pub fn mark_read(&self, article: &Article, read: bool) -> FlagChange {
        self.sync_state.mark_read(article, read)
    }

    pub fn mark_starred(&self, article: &Article, starred: bool) -> FlagChange {
        self.sync_state.mark_starred(article, starred)
    }

    pub async fn mark_all_read(&self, feed_url: &str) -> Result<(), ReaderError> {
        self.sync_state.mark_all_read(feed_url).await
    }

    pub fn refresh_feed(
        &self,
        folder: Folder,
        activity: ActivityHandle,
        ignore_article_limit: bool,
    ) -> RefreshHandle {
        self.refresh.refresh_feed(folder, activity, ignore_article_limit)
    }

    pub async fn refresh_all(&self, folders: Vec<Folder>, ignore_article_limit: bool) -> RefreshReport {
        self.refresh.refresh_all(folders, ignore_article_limit).await
    }

    /// Stops the token refresh timers. Tokens stay cached.
    pub fn shutdown(&self) {
        self.auth.stop_timers();
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.auth.stop_timers();
    }
}
