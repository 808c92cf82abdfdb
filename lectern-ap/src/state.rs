//! Shared playback state
//!
//! Low-frequency state (playback state, events) goes through the
//! [`EventBus`]. The high-frequency playback position is published on a
//! `watch` channel: readers always see the latest value and nothing queues up
//! behind a slow reader.

use lectern_common::events::{EventBus, LecternEvent, PlaybackState};
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};

/// Position inside the sentence currently playing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub sentence_id: Option<String>,
    pub sentence_index: Option<usize>,
    /// Fraction of buffered audio consumed (0.0..=1.0)
    pub progress: f64,
    pub read_pos: f64,
    pub write_pos: u64,
    pub samples_consumed: u64,
}

/// Publish/subscribe handle for the live playback position
#[derive(Debug)]
pub struct LivePosition {
    tx: watch::Sender<PositionSnapshot>,
}

impl LivePosition {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PositionSnapshot::default());
        Self { tx }
    }

    pub fn publish(&self, snapshot: PositionSnapshot) {
        self.tx.send_replace(snapshot);
    }

    pub fn clear(&self) {
        self.tx.send_replace(PositionSnapshot::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<PositionSnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PositionSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for LivePosition {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state accessible by the engine and the HTTP layer
pub struct SharedState {
    /// Current engine playback state
    pub playback_state: RwLock<PlaybackState>,

    /// Event bus for SSE and internal observers
    pub event_bus: EventBus,

    /// Live position within the current sentence
    pub live_position: LivePosition,
}

impl SharedState {
    pub fn new() -> Self {
        Self::with_event_capacity(256)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            playback_state: RwLock::new(PlaybackState::Stopped),
            event_bus: EventBus::new(capacity),
            live_position: LivePosition::new(),
        }
    }

    /// Broadcast an event to all listeners; no listeners is fine
    pub fn broadcast_event(&self, event: LecternEvent) {
        self.event_bus.emit_lossy(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LecternEvent> {
        self.event_bus.subscribe()
    }

    pub async fn get_playback_state(&self) -> PlaybackState {
        *self.playback_state.read().await
    }

    /// Set playback state, emitting `PlaybackStateChanged` on change
    pub async fn set_playback_state(&self, new_state: PlaybackState) {
        let old_state = {
            let mut state = self.playback_state.write().await;
            std::mem::replace(&mut *state, new_state)
        };

        if old_state != new_state {
            self.broadcast_event(LecternEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
