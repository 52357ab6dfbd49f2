// Settings Model
// Bot configuration read from the environment at startup

use std::fmt;
use std::path::PathBuf;

fn default_mongo_db() -> String {
    "streambot".to_string()
}

fn default_mongo_collection() -> String {
    "group_rtmp".to_string()
}

fn default_resolver_url() -> String {
    "https://BabyAPI.Pro/video?query={vidid}".to_string()
}

fn default_resolver_timeout_secs() -> u64 {
    60
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_thumbnail_url() -> String {
    "https://i.ytimg.com/vi/{video_id}/hqdefault.jpg".to_string()
}

fn default_thumbnail_capacity() -> usize {
    512
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_retention_days() -> u32 {
    30
}

/// Runtime configuration for the bot, read by `from_env`.
/// Secrets are left out of `Debug`.
#[derive(Clone)]
pub struct BotSettings {
    // Telegram
    pub bot_token: String,
    pub relay_chat_id: i64,

    // MongoDB
    pub mongo_uri: String,
    pub mongo_db: String,
    pub mongo_collection: String,

    // Link resolution API
    pub resolver_url: String,
    pub resolver_timeout_secs: u64,

    // Streaming
    pub work_dir: PathBuf,
    pub ffmpeg_path: String,
    pub kill_by_name_fallback: bool,

    // Thumbnails
    pub thumbnail_dir: PathBuf,
    pub thumbnail_url: String,
    pub thumbnail_capacity: usize,

    // Logging
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub log_retention_days: u32,
}

impl fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotSettings")
            .field("bot_token", &"<redacted>")
            .field("relay_chat_id", &self.relay_chat_id)
            .field("mongo_uri", &"<redacted>")
            .field("mongo_db", &self.mongo_db)
            .field("mongo_collection", &self.mongo_collection)
            .field("resolver_url", &self.resolver_url)
            .field("resolver_timeout_secs", &self.resolver_timeout_secs)
            .field("work_dir", &self.work_dir)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("kill_by_name_fallback", &self.kill_by_name_fallback)
            .field("thumbnail_dir", &self.thumbnail_dir)
            .field("thumbnail_url", &self.thumbnail_url)
            .field("thumbnail_capacity", &self.thumbnail_capacity)
            .field("data_dir", &self.data_dir)
            .field("log_dir", &self.log_dir)
            .field("log_level", &self.log_level)
            .field("log_retention_days", &self.log_retention_days)
            .finish()
    }
}

impl BotSettings {
    /// Load settings from process environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bot_token = get("STREAMBOT_BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or_else(|| "STREAMBOT_BOT_TOKEN is not set".to_string())?;
        let mongo_uri = get("STREAMBOT_MONGO_URI")
            .or_else(|| get("MONGO_DB_URI"))
            .ok_or_else(|| "STREAMBOT_MONGO_URI is not set".to_string())?;
        let relay_chat_id = get("STREAMBOT_RELAY_CHAT_ID")
            .ok_or_else(|| "STREAMBOT_RELAY_CHAT_ID is not set".to_string())?
            .parse::<i64>()
            .map_err(|e| format!("Invalid STREAMBOT_RELAY_CHAT_ID: {e}"))?;

        let data_dir = get("STREAMBOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let log_dir = get("STREAMBOT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));
        let thumbnail_dir = get("STREAMBOT_THUMB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("thumbnails"));

        let resolver_timeout_secs = match get("STREAMBOT_RESOLVER_TIMEOUT_SECS") {
            Some(value) => value
                .parse()
                .map_err(|e| format!("Invalid STREAMBOT_RESOLVER_TIMEOUT_SECS: {e}"))?,
            None => default_resolver_timeout_secs(),
        };
        let thumbnail_capacity = match get("STREAMBOT_THUMB_CAPACITY") {
            Some(value) => value
                .parse()
                .map_err(|e| format!("Invalid STREAMBOT_THUMB_CAPACITY: {e}"))?,
            None => default_thumbnail_capacity(),
        };
        let log_retention_days = match get("STREAMBOT_LOG_RETENTION_DAYS") {
            Some(value) => value
                .parse()
                .map_err(|e| format!("Invalid STREAMBOT_LOG_RETENTION_DAYS: {e}"))?,
            None => default_log_retention_days(),
        };
        let kill_by_name_fallback = match get("STREAMBOT_KILL_BY_NAME_FALLBACK") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| format!("Invalid STREAMBOT_KILL_BY_NAME_FALLBACK: {value}"))?,
            None => false,
        };

        let resolver_url = get("STREAMBOT_RESOLVER_URL").unwrap_or_else(default_resolver_url);
        if !resolver_url.contains("{vidid}") {
            return Err("STREAMBOT_RESOLVER_URL must contain {vidid}".to_string());
        }
        let thumbnail_url = get("STREAMBOT_THUMB_URL").unwrap_or_else(default_thumbnail_url);
        if !thumbnail_url.contains("{video_id}") {
            return Err("STREAMBOT_THUMB_URL must contain {video_id}".to_string());
        }

        Ok(Self {
            bot_token,
            relay_chat_id,
            mongo_uri,
            mongo_db: get("STREAMBOT_MONGO_DB").unwrap_or_else(default_mongo_db),
            mongo_collection: get("STREAMBOT_MONGO_COLLECTION")
                .unwrap_or_else(default_mongo_collection),
            resolver_url,
            resolver_timeout_secs,
            work_dir: get("STREAMBOT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_work_dir),
            ffmpeg_path: get("STREAMBOT_FFMPEG_PATH").unwrap_or_else(default_ffmpeg_path),
            kill_by_name_fallback,
            thumbnail_dir,
            thumbnail_url,
            thumbnail_capacity,
            data_dir,
            log_dir,
            log_level: get("STREAMBOT_LOG_LEVEL").unwrap_or_else(default_log_level),
            log_retention_days,
        })
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
