// Stream Config Model
// Per-group RTMP destination as stored in MongoDB

use serde::{Deserialize, Serialize};

/// RTMP destination configured for a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub group_id: i64,
    /// User who ran /setrtmp
    #[serde(rename = "user_id")]
    pub setter_user_id: i64,
    #[serde(rename = "rtmp")]
    pub rtmp_url: String,
    pub group_name: String,
}

impl StreamConfig {
    pub fn new(group_id: i64, setter_user_id: i64, rtmp_url: &str, group_name: &str) -> Self {
        Self {
            group_id,
            setter_user_id,
            rtmp_url: rtmp_url.to_string(),
            group_name: group_name.to_string(),
        }
    }
}

/// Accepts rtmp:// and rtmps:// destinations
pub fn is_rtmp_url(link: &str) -> bool {
    link.starts_with("rtmp")
}

/// Hide the stream key of an RTMP URL for logging
pub fn redact_rtmp_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "****".to_string();
    };
    match rest.split_once('/') {
        Some((host, _)) => format!("{scheme}://{host}/****"),
        None => format!("{scheme}://{rest}"),
    }
}
