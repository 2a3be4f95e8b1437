//! Stream contents (`stream/contents/...`) response parsing.

use crate::error::ReaderError;
use crate::storage::RemoteArticle;
use chrono::DateTime;
use serde::Deserialize;

const READ_STATE_SUFFIX: &str = "/state/com.google/read";
const STARRED_STATE_SUFFIX: &str = "/state/com.google/starred";

#[derive(Debug, Deserialize)]
struct StreamContents {
    #[serde(default)]
    items: Vec<StreamItem>,
}

#[derive(Debug, Deserialize)]
struct StreamItem {
    id: String,
    #[serde(default)]
    title: Option<String>,
    /// Unix seconds
    #[serde(default)]
    published: Option<i64>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    canonical: Vec<Link>,
    #[serde(default)]
    alternate: Vec<Link>,
    #[serde(default)]
    summary: Option<Content>,
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    content: String,
}

impl StreamItem {
    fn has_state(&self, suffix: &str) -> bool {
        self.categories.iter().any(|c| c.ends_with(suffix))
    }

    fn into_article(self) -> RemoteArticle {
        let read = self.has_state(READ_STATE_SUFFIX);
        let starred = self.has_state(STARRED_STATE_SUFFIX);
        let link = self
            .canonical
            .into_iter()
            .chain(self.alternate)
            .map(|l| l.href)
            .find(|href| !href.is_empty());
        let summary = self
            .content
            .into_iter()
            .chain(self.summary)
            .map(|c| c.content)
            .find(|text| !text.is_empty());

        RemoteArticle {
            guid: self.id,
            title: self.title.unwrap_or_default(),
            link,
            author: self.author.filter(|a| !a.is_empty()),
            summary,
            published: self
                .published
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            read,
            starred,
        }
    }
}

/// Parses the items of a stream contents response.
pub(crate) fn parse_stream(body: &[u8]) -> Result<Vec<RemoteArticle>, ReaderError> {
    let contents: StreamContents = serde_json::from_slice(body)
        .map_err(|e| ReaderError::InvalidResponse(format!("stream contents: {}", e)))?;
    Ok(contents
        .items
        .into_iter()
        .filter(|item| !item.id.is_empty())
        .map(StreamItem::into_article)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_stream_items() {
        let body = br#"{
            "id": "feed/https://example.com/rss",
            "updated": 1700000000,
            "items": [
                {
                    "id": "tag:google.com,2005:reader/item/0001",
                    "title": "First",
                    "published": 1700000000,
                    "author": "Ada",
                    "canonical": [{"href": "https://example.com/1"}],
                    "summary": {"direction": "ltr", "content": "<p>Short</p>"},
                    "categories": ["user/-/state/com.google/reading-list", "user/123/state/com.google/read"]
                },
                {
                    "id": "tag:google.com,2005:reader/item/0002",
                    "alternate": [{"href": "https://example.com/2", "type": "text/html"}],
                    "content": {"content": "<p>Full</p>"},
                    "summary": {"content": "ignored"},
                    "categories": ["user/-/state/com.google/starred"]
                }
            ]
        }"#;

        let articles = parse_stream(body).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.guid, "tag:google.com,2005:reader/item/0001");
        assert_eq!(first.title, "First");
        assert_eq!(first.link.as_deref(), Some("https://example.com/1"));
        assert_eq!(first.author.as_deref(), Some("Ada"));
        assert_eq!(first.summary.as_deref(), Some("<p>Short</p>"));
        assert_eq!(first.published.map(|p| p.timestamp()), Some(1_700_000_000));
        assert!(first.read);
        assert!(!first.starred);

        let second = &articles[1];
        assert_eq!(second.title, "");
        assert_eq!(second.link.as_deref(), Some("https://example.com/2"));
        assert_eq!(second.summary.as_deref(), Some("<p>Full</p>"));
        assert!(!second.read);
        assert!(second.starred);
    }

    #[test]
    fn test_missing_items_is_empty() {
        assert!(parse_stream(br#"{"id":"feed/x"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_stream(b"<rss></rss>").unwrap_err();
        assert_eq!(err.category(), "Malformed response");
    }
}
