// MediaLocator Service
// Finds the best YouTube match for a free-text query

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::services::{StreamError, StreamResult};

const SEARCH_URL: &str = "https://www.youtube.com/results";
const REQUEST_TIMEOUT_SECS: u64 = 20;
const UNKNOWN_TITLE: &str = "Unknown Title";

static INITIAL_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(?:var\s+ytInitialData|window\[.ytInitialData.\])\s*=\s*(\{.*?\});\s*</script>")
        .expect("valid ytInitialData regex")
});

/// A located video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMatch {
    pub video_id: String,
    pub title: String,
}

/// Resolves a text query to an external video id
#[async_trait]
pub trait MediaLocator: Send + Sync {
    async fn locate(&self, query: &str) -> StreamResult<VideoMatch>;
}

/// Scrapes the YouTube results page and returns the first video
pub struct YoutubeSearch {
    client: Client,
    search_url: String,
}

impl YoutubeSearch {
    pub fn new() -> Result<Self, String> {
        Self::with_url(SEARCH_URL.to_string())
    }

    pub fn with_url(search_url: String) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0")
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self { client, search_url })
    }
}

#[async_trait]
impl MediaLocator for YoutubeSearch {
    async fn locate(&self, query: &str) -> StreamResult<VideoMatch> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("search_query", query), ("hl", "en")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StreamError::Upstream(format!(
                "YouTube search returned {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        parse_search_results(&html)
            .ok_or_else(|| StreamError::NoResult("No YouTube results.".to_string()))
    }
}

/// Extract the first video from a results page
pub fn parse_search_results(html: &str) -> Option<VideoMatch> {
    let raw = INITIAL_DATA_RE.captures(html)?.get(1)?.as_str();
    let data: Value = serde_json::from_str(raw).ok()?;
    let renderer = find_video_renderer(&data)?;

    let video_id = renderer.get("videoId")?.as_str()?.to_string();
    if video_id.is_empty() {
        return None;
    }

    let title = renderer
        .get("title")
        .and_then(|title| {
            title
                .pointer("/runs/0/text")
                .or_else(|| title.get("simpleText"))
        })
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    Some(VideoMatch { video_id, title })
}

/// Depth-first search for the first `videoRenderer` object
fn find_video_renderer(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if let Some(renderer) = map.get("videoRenderer") {
                if renderer.get("videoId").is_some() {
                    return Some(renderer);
                }
            }
            map.values().find_map(find_video_renderer)
        }
        Value::Array(items) => items.iter().find_map(find_video_renderer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(data: &str) -> String {
        format!("<html><script>var ytInitialData = {data};</script></html>")
    }

    #[test]
    fn test_parse_first_video() {
        let html = page(
            r#"{"contents":{"sectionListRenderer":{"contents":[
                {"adSlotRenderer":{}},
                {"itemSectionRenderer":{"contents":[
                    {"videoRenderer":{"videoId":"dQw4w9WgXcQ","title":{"runs":[{"text":"Never Gonna Give You Up"}]}}},
                    {"videoRenderer":{"videoId":"second","title":{"runs":[{"text":"Other"}]}}}
                ]}}
            ]}}}"#,
        );
        let found = parse_search_results(&html).unwrap();
        assert_eq!(found.video_id, "dQw4w9WgXcQ");
        assert_eq!(found.title, "Never Gonna Give You Up");
    }

    #[test]
    fn test_first_video_follows_page_order() {
        let html = page(
            r#"{"twoColumnSearchResultsRenderer":{"videoRenderer":{"videoId":"top"}},
                "secondaryContents":{"videoRenderer":{"videoId":"sidebar"}}}"#,
        );
        assert_eq!(parse_search_results(&html).unwrap().video_id, "top");
    }

    #[test]
    fn test_missing_title_defaults() {
        let html = page(r#"{"a":[{"videoRenderer":{"videoId":"abc"}}]}"#);
        assert_eq!(parse_search_results(&html).unwrap().title, UNKNOWN_TITLE);
    }

    #[test]
    fn test_no_results() {
        assert!(parse_search_results(&page(r#"{"contents":[]}"#)).is_none());
        assert!(parse_search_results("<html></html>").is_none());
    }
}
