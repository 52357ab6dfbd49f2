// RTMP Commands
// Private-chat management of a group's RTMP destination

use crate::commands::{BotContext, ChatKind, Invocation};
use crate::models::{is_rtmp_url, redact_rtmp_url, StreamConfig};
use crate::services::{ChatGateway, StreamError, StreamResult};

const SET_USAGE: &str = "Usage: /setrtmp group_id rtmp_link";
const CLEAR_USAGE: &str = "Usage: /clearrtmp group_id";
const UNKNOWN_GROUP: &str = "Unknown Group";

fn require_private(inv: &Invocation) -> StreamResult<()> {
    if inv.chat_kind != ChatKind::Private {
        return Err(StreamError::InvalidInput(
            "Use this command in private chat".to_string(),
        ));
    }
    Ok(())
}

fn parse_group_id(raw: &str) -> StreamResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| StreamError::InvalidInput("Invalid group id".to_string()))
}

/// `/setrtmp <group_id> <rtmp_link>`
pub async fn set_rtmp(ctx: &BotContext, chat: &dyn ChatGateway, inv: &Invocation) -> StreamResult<()> {
    require_private(inv)?;

    let mut args = inv.args.split_whitespace();
    let (Some(raw_group), Some(link)) = (args.next(), args.next()) else {
        return Err(StreamError::InvalidInput(SET_USAGE.to_string()));
    };
    let group_id = parse_group_id(raw_group)?;
    if !is_rtmp_url(link) {
        return Err(StreamError::InvalidInput("Invalid RTMP link.".to_string()));
    }

    let group_name = match chat.chat_title(group_id).await {
        Ok(Some(title)) => title,
        Ok(None) => UNKNOWN_GROUP.to_string(),
        Err(e) => {
            log::debug!("Could not look up group {group_id}: {e}");
            UNKNOWN_GROUP.to_string()
        }
    };

    // The old destination must not keep receiving
    ctx.stop_group(group_id).await?;
    ctx.store
        .set(&StreamConfig::new(group_id, inv.user_id, link, &group_name))
        .await?;
    log::info!(
        "User {} set RTMP for group {group_id} to {}",
        inv.user_id,
        redact_rtmp_url(link)
    );

    chat.reply(
        inv.chat_id,
        inv.message_id,
        &format!("✅ RTMP link set for {group_name} ({group_id})\n\nLink: {link}"),
    )
    .await?;
    Ok(())
}

/// `/clearrtmp <group_id>`: only the user who set the destination may remove it
pub async fn clear_rtmp(ctx: &BotContext, chat: &dyn ChatGateway, inv: &Invocation) -> StreamResult<()> {
    require_private(inv)?;

    let raw_group = inv
        .args
        .split_whitespace()
        .next()
        .ok_or_else(|| StreamError::InvalidInput(CLEAR_USAGE.to_string()))?;
    let group_id = parse_group_id(raw_group)?;

    let Some(config) = ctx.store.get(group_id).await? else {
        chat.reply(
            inv.chat_id,
            inv.message_id,
            &format!("ℹ️ No RTMP link is set for group {group_id}"),
        )
        .await?;
        return Ok(());
    };
    if config.setter_user_id != inv.user_id {
        return Err(StreamError::InvalidInput(
            "Only the user who set this RTMP link can clear it".to_string(),
        ));
    }

    ctx.stop_group(group_id).await?;
    let removed = ctx.store.clear(group_id).await?;
    log::info!("User {} cleared RTMP for group {group_id}", inv.user_id);

    let text = if removed {
        format!("🗑 RTMP link cleared for {} ({group_id})", config.group_name)
    } else {
        format!("ℹ️ No RTMP link is set for group {group_id}")
    };
    chat.reply(inv.chat_id, inv.message_id, &text).await?;
    Ok(())
}
