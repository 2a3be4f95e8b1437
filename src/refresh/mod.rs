//! Feed refresh: fetching stream contents and counting new articles.
//!
//! - [`RefreshCoordinator`] - spawns per-feed refresh tasks and batch cycles
//! - [`RefreshHandle`] - cancel or await one refresh
//! - [`NewArticleCounter`] - new articles in the current sync cycle

mod coordinator;
mod counter;
mod stream;

pub use coordinator::{FeedRefreshResult, RefreshCoordinator, RefreshHandle, RefreshJob, RefreshReport};
pub use counter::NewArticleCounter;
