// Stream State Model
// Lifecycle of the single stream a group may run

use std::fmt;

/// Per-group stream lifecycle: Idle -> Starting -> Streaming -> Stopping -> Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Starting,
    Streaming,
    Stopping,
}

impl StreamState {
    pub fn is_idle(&self) -> bool {
        matches!(self, StreamState::Idle)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StreamState::Idle => "idle",
            StreamState::Starting => "starting",
            StreamState::Streaming => "streaming",
            StreamState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// Transcoder process recorded for a group.
/// Presence of the handle says nothing about whether the process is still alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveStreamHandle {
    pub group_id: i64,
    pub process_id: u32,
}
