// Streambot Commands
// Chat command handlers, independent of the Telegram transport

mod rtmp;
mod stream;

pub use rtmp::*;
pub use stream::*;

use std::sync::Arc;

use teloxide::utils::command::BotCommands;

use crate::models::StreamState;
use crate::services::{
    ChatGateway, ConfigStore, ContentFetcher, LinkSource, MediaLocator, StopOutcome, StreamError,
    StreamProcessRunner, StreamRegistry, StreamResult, ThumbnailCache,
};

/// Commands understood by the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show this help")]
    Help,
    #[command(description = "set a group's RTMP destination (private chat): /setrtmp <group_id> <rtmp_link>")]
    SetRtmp(String),
    #[command(description = "stream a song or video in this group: /playstream <query>")]
    PlayStream(String),
    #[command(description = "stop the stream in this group (admins only)")]
    EndStream,
    #[command(description = "remove a group's RTMP destination (private chat): /clearrtmp <group_id>")]
    ClearRtmp(String),
}

/// Where a command was sent from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// One received command, stripped of transport details
#[derive(Debug, Clone)]
pub struct Invocation {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub message_id: i32,
    pub user_id: i64,
    /// How the caller is addressed in replies
    pub mention: String,
    /// Everything after the command name
    pub args: String,
}

/// Shared services behind every handler
pub struct BotContext {
    pub store: Arc<dyn ConfigStore>,
    pub locator: Arc<dyn MediaLocator>,
    pub resolver: Arc<dyn LinkSource>,
    pub fetcher: ContentFetcher,
    pub runner: StreamProcessRunner,
    pub registry: StreamRegistry,
    pub thumbnails: ThumbnailCache,
    pub bot_username: String,
}

impl BotContext {
    pub fn start_group_url(&self) -> String {
        format!("https://t.me/{}?startgroup=true", self.bot_username)
    }

    /// Move the group through Stopping and kill whatever it has running
    pub(crate) async fn stop_group(&self, group_id: i64) -> StreamResult<StopOutcome> {
        let _stopping = self.registry.begin_stop(group_id)?;
        Ok(self.runner.stop_stream(group_id).await)
    }
}

/// Run one command and report any failure back to the caller
pub async fn dispatch(ctx: &BotContext, chat: &dyn ChatGateway, inv: &Invocation, command: Command) {
    let result = match command {
        Command::Help => chat
            .reply(inv.chat_id, inv.message_id, &Command::descriptions().to_string())
            .await
            .map(|_| ())
            .map_err(StreamError::from),
        Command::SetRtmp(_) => set_rtmp(ctx, chat, inv).await,
        Command::PlayStream(_) => play_stream(ctx, chat, inv).await,
        Command::EndStream => end_stream(ctx, chat, inv).await,
        Command::ClearRtmp(_) => clear_rtmp(ctx, chat, inv).await,
    };

    if let Err(e) = result {
        let text = error_reply(&e);
        if let Err(reply_err) = chat.reply(inv.chat_id, inv.message_id, &text).await {
            // The command message may already be gone (/playstream deletes it)
            log::debug!("Reply in chat {} failed: {reply_err}", inv.chat_id);
            if let Err(send_err) = chat.send_text(inv.chat_id, &text).await {
                log::warn!("Failed to report '{e}' in chat {}: {send_err}", inv.chat_id);
            }
        }
    }
}

/// User-facing text for a failed command
pub fn error_reply(error: &StreamError) -> String {
    match error {
        StreamError::InvalidInput(message) => format!("⚠️ {message}"),
        StreamError::NotConfigured(_) => {
            "⚠️ This group has no RTMP set.\n\n👉 Set it in private using /setrtmp".to_string()
        }
        StreamError::NoResult(message) => format!("❌ {message}"),
        StreamError::Upstream(message) => format!("❌ API error: {message}"),
        StreamError::Media(message) => format!("❌ Error: {message}"),
        StreamError::Process(message) => format!("❌ FFmpeg failed: {message}"),
        StreamError::PermissionDenied => "⚠️ Only admins can stop the stream!".to_string(),
        StreamError::Busy(state) => match state {
            StreamState::Stopping => "⏳ The stream in this group is stopping, try again shortly".to_string(),
            _ => format!("⚠️ A stream is already {} in this group", busy_label(*state)),
        },
        StreamError::Chat(e) => format!("❌ Error: {e}"),
        StreamError::Storage(e) => {
            log::error!("Storage failure: {e}");
            "❌ Something went wrong, try again later".to_string()
        }
        StreamError::Io(e) => {
            log::error!("IO failure: {e}");
            "❌ Something went wrong, try again later".to_string()
        }
    }
}

fn busy_label(state: StreamState) -> &'static str {
    match state {
        StreamState::Streaming => "running",
        _ => "starting",
    }
}
