//! String forms the service uses to address feeds, folders and flags.

const FEED_PREFIX: &str = "feed/";
const LABEL_PREFIX: &str = "user/-/label/";
const LABEL_MARKER: &str = "/label/";

/// State tag marking an item as read.
pub const READ_TAG: &str = "user/-/state/com.google/read";
/// State tag marking an item as starred.
pub const STARRED_TAG: &str = "user/-/state/com.google/starred";

/// Stream id for a feed URL: `feed/<url>`.
pub fn feed_stream_id(feed_url: &str) -> String {
    format!("{}{}", FEED_PREFIX, feed_url.trim())
}

/// Inverse of [`feed_stream_id`]. Returns `None` for label or state streams.
pub fn feed_url_from_stream_id(stream_id: &str) -> Option<&str> {
    stream_id
        .strip_prefix(FEED_PREFIX)
        .filter(|url| !url.is_empty())
}

/// Label tag for a folder name, e.g. `user/-/label/Tech/Rust`.
///
/// Nested folder paths are passed through unchanged; the service treats the
/// whole string as one label. Returns `None` for a blank name.
pub fn label_tag(folder_name: &str) -> Option<String> {
    let name = folder_name.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("{}{}", LABEL_PREFIX, name))
}

/// Folder name from a label id as returned by the service
/// (`user/<numeric id>/label/<name>` or `user/-/label/<name>`).
pub fn label_name(label_id: &str) -> Option<&str> {
    if !label_id.starts_with("user/") {
        return None;
    }
    label_id
        .find(LABEL_MARKER)
        .map(|idx| &label_id[idx + LABEL_MARKER.len()..])
        .filter(|name| !name.is_empty())
}

/// Percent-encodes a value for use as a single URL path segment.
///
/// Unlike form encoding, spaces become `%20` so the segment survives
/// path normalization on the server.
pub fn encode_path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
