// Service Errors
// Failure taxonomy surfaced to chat users by the command handlers

use thiserror::Error;

use crate::models::StreamState;

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised while configuring, starting or stopping a stream
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("No RTMP destination set for group {0}")]
    NotConfigured(i64),

    #[error("{0}")]
    NoResult(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("{0}")]
    Media(String),

    #[error("Transcoder failed: {0}")]
    Process(String),

    #[error("Only admins can do that")]
    PermissionDenied,

    #[error("Stream is {0} in this group")]
    Busy(StreamState),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram error: {0}")]
    Chat(#[from] ChatError),
}

/// A failed call to the chat platform
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ChatError(pub String);

/// Errors from the RTMP configuration store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        StreamError::Upstream(e.to_string())
    }
}
