// ContentFetcher Service
// Downloads the media behind a t.me message link

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::services::{StreamError, StreamResult};

static TG_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://t\.me/(?:(?P<c>c)/(?P<c_id>\d+)|(?P<user>[A-Za-z0-9_]+))/(?P<msg_id>\d+)$")
        .expect("valid t.me link regex")
});

/// Chat addressed by a message link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    /// Public `t.me/<username>/<id>` link
    Username(String),
    /// Private `t.me/c/<internal>/<id>` link, already mapped to `-100<internal>`
    Id(i64),
}

/// A message addressed by a t.me link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatRef,
    pub message_id: i32,
}

impl MessageRef {
    /// Parse `https://t.me/<username>/<id>` or `https://t.me/c/<internal>/<id>`
    pub fn parse(link: &str) -> StreamResult<Self> {
        let unsupported = || StreamError::Media(format!("Unsupported Telegram link: {link}"));
        let caps = TG_LINK_RE.captures(link.trim()).ok_or_else(unsupported)?;

        let message_id = caps["msg_id"].parse::<i32>().map_err(|_| unsupported())?;

        let chat = if caps.name("c").is_some() {
            let internal = &caps["c_id"];
            let chat_id = format!("-100{internal}")
                .parse::<i64>()
                .map_err(|_| unsupported())?;
            ChatRef::Id(chat_id)
        } else {
            // t.me/c/ is reserved for private links, never a username
            let username = &caps["user"];
            if username == "c" {
                return Err(unsupported());
            }
            ChatRef::Username(username.to_string())
        };

        Ok(Self { chat, message_id })
    }
}

/// Kinds of media the transcoder can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Document,
    Animation,
}

/// Downloadable attachment of a source message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMedia {
    pub kind: MediaKind,
    pub file_id: String,
}

/// A fetched source message; `media` is None when it carries nothing downloadable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub media: Option<SourceMedia>,
}

/// Where source messages live (Telegram in production)
#[async_trait]
pub trait ContentOrigin: Send + Sync {
    /// Look up a message. Ok(None) means it does not exist or is not visible.
    async fn fetch_message(&self, message: &MessageRef) -> StreamResult<Option<SourceMessage>>;

    /// Download an attachment to `dest`, returning the saved path
    async fn download(&self, media: &SourceMedia, dest: &Path) -> StreamResult<PathBuf>;
}

/// Resolves message links and downloads their media
pub struct ContentFetcher {
    origin: Arc<dyn ContentOrigin>,
}

impl ContentFetcher {
    pub fn new(origin: Arc<dyn ContentOrigin>) -> Self {
        Self { origin }
    }

    pub async fn fetch_from_link(&self, link: &str, dest: &Path) -> StreamResult<PathBuf> {
        let message_ref = MessageRef::parse(link)?;
        log::debug!("Fetching {:?} from {link}", message_ref);

        let message = self
            .origin
            .fetch_message(&message_ref)
            .await?
            .ok_or_else(|| StreamError::Media(format!("Message not found: {link}")))?;

        let media = message.media.ok_or_else(|| {
            StreamError::Media("No downloadable media found in the given Telegram message.".to_string())
        })?;

        let saved = self.origin.download(&media, dest).await?;
        if !tokio::fs::try_exists(&saved).await.unwrap_or(false) {
            return Err(StreamError::Media(
                "Download failed or file missing after download.".to_string(),
            ));
        }

        log::info!("Downloaded {:?} from {link} to {}", media.kind, saved.display());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_internal_link() {
        let parsed = MessageRef::parse("https://t.me/c/123456789/45").unwrap();
        assert_eq!(parsed.chat, ChatRef::Id(-100123456789));
        assert_eq!(parsed.message_id, 45);
    }

    #[test]
    fn test_parse_username_link() {
        let parsed = MessageRef::parse(" http://t.me/mychannel/7 ").unwrap();
        assert_eq!(parsed.chat, ChatRef::Username("mychannel".to_string()));
        assert_eq!(parsed.message_id, 7);
    }

    #[test]
    fn test_rejects_malformed_links() {
        for link in [
            "https://t.me/mychannel",
            "https://t.me/c/123456789",
            "https://t.me/mychannel/7/extra",
            "https://example.com/mychannel/7",
            "https://t.me/bad-name/7",
            "https://t.me/mychannel/99999999999",
        ] {
            assert!(
                matches!(MessageRef::parse(link), Err(StreamError::Media(_))),
                "{link} should be rejected"
            );
        }
    }

    struct StubOrigin {
        message: Option<SourceMessage>,
        write_file: bool,
        downloads: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ContentOrigin for StubOrigin {
        async fn fetch_message(&self, _message: &MessageRef) -> StreamResult<Option<SourceMessage>> {
            Ok(self.message.clone())
        }

        async fn download(&self, _media: &SourceMedia, dest: &Path) -> StreamResult<PathBuf> {
            if self.write_file {
                tokio::fs::write(dest, b"media").await?;
            }
            self.downloads.lock().unwrap().push(dest.to_path_buf());
            Ok(dest.to_path_buf())
        }
    }

    fn fetcher(message: Option<SourceMessage>, write_file: bool) -> (ContentFetcher, Arc<StubOrigin>) {
        let origin = Arc::new(StubOrigin {
            message,
            write_file,
            downloads: Mutex::new(Vec::new()),
        });
        (ContentFetcher::new(origin.clone()), origin)
    }

    fn video() -> Option<SourceMessage> {
        Some(SourceMessage {
            media: Some(SourceMedia {
                kind: MediaKind::Video,
                file_id: "file-1".to_string(),
            }),
        })
    }

    #[tokio::test]
    async fn test_fetch_saves_media() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("video.mp4");
        let (fetcher, origin) = fetcher(video(), true);

        let saved = fetcher.fetch_from_link("https://t.me/src/3", &dest).await.unwrap();
        assert_eq!(saved, dest);
        assert_eq!(origin.downloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_message_and_media() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("video.mp4");

        let (missing, _) = fetcher(None, true);
        let err = missing.fetch_from_link("https://t.me/src/3", &dest).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        let (no_media, origin) = fetcher(Some(SourceMessage { media: None }), true);
        let err = no_media.fetch_from_link("https://t.me/src/3", &dest).await.unwrap_err();
        assert!(err.to_string().contains("No downloadable media"));
        assert!(origin.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_missing_after_download() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("video.mp4");
        let (fetcher, _) = fetcher(video(), false);

        let err = fetcher.fetch_from_link("https://t.me/src/3", &dest).await.unwrap_err();
        assert!(err.to_string().contains("missing after download"));
    }
}
