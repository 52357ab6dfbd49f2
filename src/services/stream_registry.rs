// StreamRegistry Service
// Per-group stream state machine so a group never runs two streams at once

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::StreamState;
use crate::services::{StreamError, StreamResult};

type Slot = Arc<Mutex<StreamState>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, StreamState> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tracks the lifecycle of every group's stream.
/// Each group has its own lock; transitions for different groups never contend.
#[derive(Default)]
pub struct StreamRegistry {
    groups: Mutex<HashMap<i64, Slot>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, group_id: i64) -> Slot {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups.entry(group_id).or_default().clone()
    }

    /// Current state of a group
    pub fn state(&self, group_id: i64) -> StreamState {
        *lock_slot(&self.slot(group_id))
    }

    /// Idle -> Starting. The returned guard falls back to Idle unless committed.
    pub fn begin_start(&self, group_id: i64) -> StreamResult<StartGuard> {
        let slot = self.slot(group_id);
        {
            let mut state = lock_slot(&slot);
            if !state.is_idle() {
                return Err(StreamError::Busy(*state));
            }
            *state = StreamState::Starting;
        }
        log::debug!("Group {group_id}: idle -> starting");
        Ok(StartGuard {
            group_id,
            slot,
            committed: false,
        })
    }

    /// Idle|Streaming -> Stopping. The returned guard moves to Idle when dropped.
    pub fn begin_stop(&self, group_id: i64) -> StreamResult<StopGuard> {
        let slot = self.slot(group_id);
        {
            let mut state = lock_slot(&slot);
            match *state {
                StreamState::Idle | StreamState::Streaming => {
                    log::debug!("Group {group_id}: {} -> stopping", *state);
                    *state = StreamState::Stopping;
                }
                busy => return Err(StreamError::Busy(busy)),
            }
        }
        Ok(StopGuard { group_id, slot })
    }

    /// Streaming -> Idle for a transcoder that exited on its own
    pub fn finish(&self, group_id: i64) {
        let slot = self.slot(group_id);
        let mut state = lock_slot(&slot);
        if *state == StreamState::Streaming {
            *state = StreamState::Idle;
            log::debug!("Group {group_id}: transcoder gone, streaming -> idle");
        }
    }
}

/// Held while a group is Starting
pub struct StartGuard {
    group_id: i64,
    slot: Slot,
    committed: bool,
}

impl StartGuard {
    /// Starting -> Streaming
    pub fn commit(mut self) {
        *lock_slot(&self.slot) = StreamState::Streaming;
        self.committed = true;
        log::debug!("Group {}: starting -> streaming", self.group_id);
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if !self.committed {
            *lock_slot(&self.slot) = StreamState::Idle;
            log::debug!("Group {}: start abandoned, back to idle", self.group_id);
        }
    }
}

/// Held while a group is Stopping
pub struct StopGuard {
    group_id: i64,
    slot: Slot,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        *lock_slot(&self.slot) = StreamState::Idle;
        log::debug!("Group {}: stopping -> idle", self.group_id);
    }
}
