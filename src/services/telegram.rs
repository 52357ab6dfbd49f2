// Telegram Service
// Chat platform seam: outgoing messages, admin checks and media downloads

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, Recipient,
    ReplyParameters,
};
use teloxide::{ApiError, RequestError};
use tokio::io::AsyncWriteExt;

use crate::services::{
    ChatError, ChatRef, ContentOrigin, MediaKind, MessageRef, SourceMedia, SourceMessage,
    StreamError, StreamResult,
};

const START_GROUP_BUTTON: &str = "✙ Add me to your group ✙";

/// Announcement posted once a stream is live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNotice {
    pub text: String,
    /// Sent as a photo with `text` as caption when present
    pub photo: Option<PathBuf>,
    /// Target of the "add me to your group" button
    pub start_group_url: String,
}

/// Everything the command handlers need from the chat platform
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Reply to a message, returning the new message id
    async fn reply(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<i32, ChatError>;

    /// Post a standalone message, returning its id
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, ChatError>;

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), ChatError>;

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), ChatError>;

    async fn send_notice(&self, chat_id: i64, notice: &StreamNotice) -> Result<(), ChatError>;

    /// Whether the user is an administrator or the owner of the chat
    async fn is_admin(&self, chat_id: i64, user_id: i64) -> Result<bool, ChatError>;

    /// Display title of a group, if it has one
    async fn chat_title(&self, chat_id: i64) -> Result<Option<String>, ChatError>;
}

impl From<RequestError> for ChatError {
    fn from(e: RequestError) -> Self {
        ChatError(e.to_string())
    }
}

/// `ChatGateway` over the Bot API
#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
}

impl TelegramChat {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatGateway for TelegramChat {
    async fn reply(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<i32, ChatError> {
        let sent = self
            .bot
            .send_message(ChatId(chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply())
            .await?;
        Ok(sent.id.0)
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, ChatError> {
        let sent = self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(sent.id.0)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), ChatError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .await?;
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), ChatError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn send_notice(&self, chat_id: i64, notice: &StreamNotice) -> Result<(), ChatError> {
        let button = InlineKeyboardButton::url(
            START_GROUP_BUTTON,
            notice
                .start_group_url
                .parse()
                .map_err(|e| ChatError(format!("Invalid start group url: {e}")))?,
        );
        let markup = InlineKeyboardMarkup::new(vec![vec![button]]);

        match &notice.photo {
            Some(photo) => {
                self.bot
                    .send_photo(ChatId(chat_id), InputFile::file(photo))
                    .caption(notice.text.as_str())
                    .reply_markup(markup)
                    .await?;
            }
            None => {
                self.bot
                    .send_message(ChatId(chat_id), notice.text.as_str())
                    .reply_markup(markup)
                    .await?;
            }
        }
        Ok(())
    }

    async fn is_admin(&self, chat_id: i64, user_id: i64) -> Result<bool, ChatError> {
        let user_id = u64::try_from(user_id).map_err(|_| ChatError(format!("Invalid user id {user_id}")))?;
        let member = self.bot.get_chat_member(ChatId(chat_id), UserId(user_id)).await?;
        Ok(member.kind.is_privileged())
    }

    async fn chat_title(&self, chat_id: i64) -> Result<Option<String>, ChatError> {
        let chat = self.bot.get_chat(ChatId(chat_id)).await?;
        Ok(chat.title().map(str::to_string))
    }
}

/// Reads source messages by forwarding them into a relay chat the bot can post in.
/// Bots cannot fetch arbitrary messages, but a forwarded copy carries the same file ids.
pub struct TelegramOrigin {
    bot: Bot,
    relay_chat_id: i64,
}

impl TelegramOrigin {
    pub fn new(bot: Bot, relay_chat_id: i64) -> Self {
        Self { bot, relay_chat_id }
    }
}

fn source_recipient(chat: &ChatRef) -> Recipient {
    match chat {
        ChatRef::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
        ChatRef::Id(id) => Recipient::Id(ChatId(*id)),
    }
}

fn source_media(message: &Message) -> Option<SourceMedia> {
    if let Some(video) = message.video() {
        return Some(SourceMedia {
            kind: MediaKind::Video,
            file_id: video.file.id.clone(),
        });
    }
    if let Some(animation) = message.animation() {
        return Some(SourceMedia {
            kind: MediaKind::Animation,
            file_id: animation.file.id.clone(),
        });
    }
    message.document().map(|document| SourceMedia {
        kind: MediaKind::Document,
        file_id: document.file.id.clone(),
    })
}

#[async_trait]
impl ContentOrigin for TelegramOrigin {
    async fn fetch_message(&self, message: &MessageRef) -> StreamResult<Option<SourceMessage>> {
        let forwarded = self
            .bot
            .forward_message(
                ChatId(self.relay_chat_id),
                source_recipient(&message.chat),
                MessageId(message.message_id),
            )
            .await;

        let copy = match forwarded {
            Ok(copy) => copy,
            Err(RequestError::Api(ApiError::MessageToForwardNotFound)) => return Ok(None),
            Err(RequestError::Api(e)) => {
                log::warn!("Cannot read {:?}: {e}", message);
                return Ok(None);
            }
            Err(e) => return Err(StreamError::Upstream(e.to_string())),
        };

        let media = source_media(&copy);
        if let Err(e) = self.bot.delete_message(copy.chat.id, copy.id).await {
            log::debug!("Failed to remove relay copy {}: {e}", copy.id.0);
        }

        Ok(Some(SourceMessage { media }))
    }

    async fn download(&self, media: &SourceMedia, dest: &Path) -> StreamResult<PathBuf> {
        let file = self
            .bot
            .get_file(media.file_id.clone())
            .await
            .map_err(|e| StreamError::Media(format!("Telegram refused the file: {e}")))?;

        let mut out = tokio::fs::File::create(dest).await?;
        let written = match self.bot.download_file(&file.path, &mut out).await {
            Ok(()) => write_through(&mut out).await,
            Err(e) => Err(e.to_string()),
        };
        drop(out);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(StreamError::Media(format!("Download failed: {e}")));
        }
        Ok(dest.to_path_buf())
    }
}

/// Push buffered writes to the OS; tokio may still hold the last chunk otherwise
async fn write_through(out: &mut tokio::fs::File) -> Result<(), String> {
    out.flush().await.map_err(|e| e.to_string())?;
    out.sync_all().await.map_err(|e| e.to_string())
}
