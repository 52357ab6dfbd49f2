// Stream Commands
// Starts and stops a group's re-stream

use crate::commands::{error_reply, BotContext, ChatKind, Invocation};
use crate::models::StreamState;
use crate::services::{ChatGateway, StreamError, StreamNotice, StreamResult, VideoMatch};

const PLAY_USAGE: &str = "Usage: /playstream song name";

/// `/playstream <query>`
pub async fn play_stream(ctx: &BotContext, chat: &dyn ChatGateway, inv: &Invocation) -> StreamResult<()> {
    if inv.chat_kind == ChatKind::Private {
        let text = if ctx.store.find_by_setter(inv.user_id).await?.is_some() {
            "✅ Now use /playstream song name in your group."
        } else {
            "⚠️ Please set RTMP first using /setrtmp group_id rtmp_link"
        };
        chat.reply(inv.chat_id, inv.message_id, text).await?;
        return Ok(());
    }

    let group_id = inv.chat_id;
    let config = ctx
        .store
        .get(group_id)
        .await?
        .ok_or(StreamError::NotConfigured(group_id))?;

    let query = inv.args.trim();
    if query.is_empty() {
        return Err(StreamError::InvalidInput(PLAY_USAGE.to_string()));
    }

    // A transcoder that exited on its own leaves the group idle again
    if ctx.registry.state(group_id) == StreamState::Streaming && !ctx.runner.is_running(group_id).await {
        ctx.registry.finish(group_id);
    }
    let starting = ctx.registry.begin_start(group_id)?;

    // Left over from before a restart; never push two streams at one endpoint
    if let Some(stale) = ctx.runner.read_handle(group_id).await {
        log::warn!("Group {group_id} has a stale transcoder {}, stopping it", stale.process_id);
        ctx.runner.stop_stream(group_id).await;
    }

    if let Err(e) = chat.delete(inv.chat_id, inv.message_id).await {
        log::debug!("Could not delete /playstream message in {group_id}: {e}");
    }
    let progress = chat
        .send_text(group_id, &format!("🔎 Searching... {query}"))
        .await?;

    let video = match start_pipeline(ctx, group_id, query, &config.rtmp_url).await {
        Ok(video) => video,
        Err(e) => {
            log::warn!("Failed to start stream in group {group_id}: {e}");
            ctx.runner.remove_media(group_id).await;
            drop(starting);
            if let Err(edit_err) = chat.edit_text(group_id, progress, &error_reply(&e)).await {
                log::warn!("Failed to report error in group {group_id}: {edit_err}");
            }
            return Ok(());
        }
    };
    starting.commit();

    if let Err(e) = chat.delete(group_id, progress).await {
        log::debug!("Could not delete progress message in {group_id}: {e}");
    }

    let photo = match ctx.thumbnails.get_thumbnail(&video.video_id).await {
        Ok(path) => Some(path),
        Err(e) => {
            log::warn!("No thumbnail for {}: {e}", video.video_id);
            None
        }
    };
    let notice = StreamNotice {
        text: format!(
            "📡 Streaming now...\n\n🎵 Title: {}\n\n🙋 Played by: {}",
            video.title, inv.mention
        ),
        photo,
        start_group_url: ctx.start_group_url(),
    };
    chat.send_notice(group_id, &notice).await?;
    Ok(())
}

/// Locate, resolve, download and launch. Leaves the transcoder running on success.
async fn start_pipeline(
    ctx: &BotContext,
    group_id: i64,
    query: &str,
    rtmp_url: &str,
) -> StreamResult<VideoMatch> {
    let video = ctx.locator.locate(query).await?;
    log::info!("Group {group_id}: '{query}' matched {} ({})", video.video_id, video.title);

    let link = ctx.resolver.resolve(&video.video_id).await?;

    ctx.runner.remove_media(group_id).await;
    let media = ctx
        .fetcher
        .fetch_from_link(&link, &ctx.runner.media_path(group_id))
        .await?;

    ctx.runner.start_stream(&media, rtmp_url, group_id).await?;
    Ok(video)
}

/// `/endstream`: admins only in groups. Keeps the RTMP configuration.
pub async fn end_stream(ctx: &BotContext, chat: &dyn ChatGateway, inv: &Invocation) -> StreamResult<()> {
    let group_id = inv.chat_id;
    if inv.chat_kind == ChatKind::Group && !chat.is_admin(group_id, inv.user_id).await? {
        return Err(StreamError::PermissionDenied);
    }

    let outcome = ctx.stop_group(group_id).await?;
    log::info!("Group {group_id}: stream stopped by {} ({outcome:?})", inv.user_id);

    chat.reply(
        inv.chat_id,
        inv.message_id,
        &format!("🛑 Stream stopped by {}", inv.mention),
    )
    .await?;
    Ok(())
}
