// Streambot
// Telegram bot that re-streams YouTube matches to each group's RTMP destination

use std::sync::Arc;
use std::time::Duration;

use mongodb::options::ClientOptions;
use teloxide::prelude::*;

use streambot::commands::{dispatch, BotContext, ChatKind, Command, Invocation};
use streambot::models::BotSettings;
use streambot::services::{
    init_logger, prune_logs, ContentFetcher, HttpThumbnailSource, LinkResolver, MongoConfigStore,
    StreamProcessRunner, StreamRegistry, SystemProcessControl, TelegramChat, TelegramOrigin,
    ThumbnailCache, YoutubeSearch,
};

const MONGO_SELECTION_TIMEOUT_SECS: u64 = 10;

fn mention(user: &teloxide::types::User) -> String {
    match &user.username {
        Some(username) => format!("@{username}"),
        None => user.full_name(),
    }
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    // Channel posts and anonymous admins carry no user to act for
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let chat_kind = if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatKind::Group
    } else {
        return Ok(());
    };

    let args = match &cmd {
        Command::SetRtmp(args) | Command::PlayStream(args) | Command::ClearRtmp(args) => args.clone(),
        Command::Help | Command::EndStream => String::new(),
    };

    let inv = Invocation {
        chat_id: msg.chat.id.0,
        chat_kind,
        message_id: msg.id.0,
        user_id: user.id.0 as i64,
        mention: mention(user),
        args,
    };
    log::debug!("{:?} from user {} in chat {}", cmd, inv.user_id, inv.chat_id);

    let chat = TelegramChat::new(bot);
    dispatch(&ctx, &chat, &inv, cmd).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = BotSettings::from_env()?;

    std::fs::create_dir_all(&settings.data_dir)?;
    std::fs::create_dir_all(&settings.work_dir)?;
    std::fs::create_dir_all(&settings.thumbnail_dir)?;

    init_logger(&settings.log_dir, &settings.log_level)?;
    match prune_logs(&settings.log_dir, settings.log_retention_days) {
        Ok(0) => {}
        Ok(removed) => log::info!("Pruned {removed} old log files"),
        Err(e) => log::warn!("Log pruning failed: {e}"),
    }
    log::info!("Starting streambot");

    let mut mongo_options = ClientOptions::parse(&settings.mongo_uri).await?;
    mongo_options.server_selection_timeout = Some(Duration::from_secs(MONGO_SELECTION_TIMEOUT_SECS));
    let mongo = mongodb::Client::with_options(mongo_options)?;
    let store = MongoConfigStore::new(
        &mongo.database(&settings.mongo_db),
        &settings.mongo_collection,
    );
    store.setup_collection().await?;
    log::info!(
        "Using MongoDB collection {}.{}",
        settings.mongo_db,
        settings.mongo_collection
    );

    let bot = Bot::new(settings.bot_token.clone());
    let me = bot.get_me().await?;
    log::info!("Logged in as @{}", me.username());

    let ctx = Arc::new(BotContext {
        store: Arc::new(store),
        locator: Arc::new(YoutubeSearch::new()?),
        resolver: Arc::new(LinkResolver::new(
            settings.resolver_url.clone(),
            settings.resolver_timeout_secs,
        )?),
        fetcher: ContentFetcher::new(Arc::new(TelegramOrigin::new(
            bot.clone(),
            settings.relay_chat_id,
        ))),
        runner: StreamProcessRunner::new(
            settings.work_dir.clone(),
            settings.ffmpeg_path.clone(),
            settings.kill_by_name_fallback,
            Arc::new(SystemProcessControl),
        ),
        registry: StreamRegistry::new(),
        thumbnails: ThumbnailCache::new(
            settings.thumbnail_dir.clone(),
            Arc::new(HttpThumbnailSource::new(settings.thumbnail_url.clone())?),
            settings.thumbnail_capacity,
        ),
        bot_username: me.username().to_string(),
    });

    if settings.kill_by_name_fallback {
        log::warn!("Kill-by-name fallback is enabled; /endstream may stop other groups' transcoders");
    }

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_command);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Streambot stopped");
    Ok(())
}
