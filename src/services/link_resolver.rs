// LinkResolver Service
// Asks the resolution API where a video is stored on Telegram

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::services::{StreamError, StreamResult};

/// JSON keys checked in order before falling back to a text scan
const CANDIDATE_KEYS: [&str; 4] = ["channel_link", "link", "url", "telegram"];

static TG_LINK_SCAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://t\.me/[^\s"'>]+"#).expect("valid t.me scan regex"));

/// Find a Telegram message link in an API response.
///
/// A parsed JSON object is consulted first; `body` is scanned only when no
/// candidate key holds a string mentioning `t.me`.
pub fn extract_tg_link(body: &str, json: Option<&Value>) -> Option<String> {
    if let Some(Value::Object(map)) = json {
        for key in CANDIDATE_KEYS {
            if let Some(Value::String(value)) = map.get(key) {
                if value.contains("t.me") {
                    return Some(value.trim().to_string());
                }
            }
        }
    }

    TG_LINK_SCAN_RE
        .find(body)
        .map(|found| found.as_str().to_string())
}

/// Maps a YouTube video id to the t.me link of a stored copy
#[async_trait]
pub trait LinkSource: Send + Sync {
    async fn resolve(&self, video_id: &str) -> StreamResult<String>;
}

/// Client for the third-party resolution API
pub struct LinkResolver {
    client: Client,
    url_template: String,
}

impl LinkResolver {
    /// `url_template` must contain `{vidid}`
    pub fn new(url_template: String, timeout_secs: u64) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            url_template,
        })
    }

    fn request_url(&self, video_id: &str) -> String {
        self.url_template
            .replace("{vidid}", &urlencoding::encode(video_id))
    }
}

#[async_trait]
impl LinkSource for LinkResolver {
    async fn resolve(&self, video_id: &str) -> StreamResult<String> {
        let url = self.request_url(video_id);
        log::debug!("Resolving video {video_id} via {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StreamError::Upstream(format!("API returned {status}")));
        }

        let json = serde_json::from_str::<Value>(&body).ok();
        extract_tg_link(&body, json.as_ref()).ok_or_else(|| {
            log::warn!("Resolution API response for {video_id} had no Telegram link");
            StreamError::Upstream("API response fail.".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_from_json_key() {
        let body = r#"{"link": "https://t.me/xyz/5"}"#;
        let json: Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            extract_tg_link(body, Some(&json)).as_deref(),
            Some("https://t.me/xyz/5")
        );
    }

    #[test]
    fn test_key_priority() {
        let json = json!({
            "url": "https://t.me/second/2",
            "channel_link": " https://t.me/first/1 ",
        });
        assert_eq!(
            extract_tg_link("", Some(&json)).as_deref(),
            Some("https://t.me/first/1")
        );
    }

    #[test]
    fn test_skips_non_telegram_values() {
        let json = json!({ "link": "https://example.com/5", "telegram": 12 });
        assert_eq!(extract_tg_link("nothing here", Some(&json)), None);
    }

    #[test]
    fn test_falls_back_to_text_scan() {
        let json = json!({ "status": "ok" });
        let body = r#"{"status":"ok","note":"see https://t.me/abc/9"}"#;
        assert_eq!(
            extract_tg_link(body, Some(&json)).as_deref(),
            Some("https://t.me/abc/9")
        );
        assert_eq!(
            extract_tg_link("file at https://t.me/abc/9 today", None).as_deref(),
            Some("https://t.me/abc/9")
        );
    }

    #[test]
    fn test_absent() {
        assert_eq!(extract_tg_link("plain text", None), None);
    }

    #[tokio::test]
    async fn test_resolve_plain_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video"))
            .and(query_param("query", "vid123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("https://t.me/c/123/45"))
            .expect(1)
            .mount(&server)
            .await;

        let resolver =
            LinkResolver::new(format!("{}/video?query={{vidid}}", server.uri()), 5).unwrap();
        assert_eq!(resolver.resolve("vid123").await.unwrap(), "https://t.me/c/123/45");
    }

    #[tokio::test]
    async fn test_resolve_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("https://t.me/a/1"))
            .mount(&server)
            .await;

        let resolver =
            LinkResolver::new(format!("{}/video?query={{vidid}}", server.uri()), 5).unwrap();
        assert!(matches!(
            resolver.resolve("x").await,
            Err(StreamError::Upstream(_))
        ));
    }
}
