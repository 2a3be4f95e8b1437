//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: feed URLs (SSRF-safe) and service base URLs (HTTPS)
//! - **Stream identifiers**: the `feed/`, `user/-/label/` and state-tag
//!   strings the service uses to address feeds, folders and flags
//!
//! # Examples
//!
//! ```
//! use reader_sync::util::{feed_stream_id, label_tag, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(feed_stream_id(url.as_str()), "feed/https://example.com/feed.xml");
//! assert_eq!(label_tag("Tech/Rust").as_deref(), Some("user/-/label/Tech/Rust"));
//! ```

mod stream_id;
mod url_validator;

pub use stream_id::{
    encode_path_segment, feed_stream_id, feed_url_from_stream_id, label_name, label_tag,
    READ_TAG, STARRED_TAG,
};
pub use url_validator::{validate_feed_url, validate_service_url, UrlValidationError};
