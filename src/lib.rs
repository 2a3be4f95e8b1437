//! Synchronization client for Google Reader compatible feed aggregation
//! services.
//!
//! [`Reader`] is the entry point: it authenticates lazily, keeps the
//! session and action tokens fresh, and turns local intents (subscribe,
//! mark read, refresh) into authenticated API calls.
//!
//! ```no_run
//! use reader_sync::{Config, MemoryFeedStore, Reader, SyncTrigger};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::parse("username = \"reader@example.com\"\npassword = \"secret\"\n")?;
//! let store = Arc::new(MemoryFeedStore::new());
//! let reader = Reader::from_config(&config, store.clone())?;
//!
//! reader.load_subscriptions(SyncTrigger::ApplicationReady).await?;
//! println!("{} subscriptions", store.subscriptions().len());
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod reader;
pub mod refresh;
pub mod storage;
pub mod subscriptions;
pub mod sync_state;
pub mod transport;
pub mod util;

pub use activity::{ActivityHandle, ActivityLog, MemoryActivityLog, TracingActivityLog};
pub use config::{Config, ConfigError};
pub use error::ReaderError;
pub use reader::{Reader, SyncTrigger};
pub use refresh::{RefreshHandle, RefreshReport};
pub use storage::{Article, FeedStore, Folder, MemoryFeedStore};
pub use sync_state::{ArticleFlag, FlagChange};
