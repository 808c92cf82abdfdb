//! Event types for the Lectern event system
//!
//! Events are broadcast through the [`EventBus`] and serialized for SSE
//! transmission. Sentence and playback state enums live here because both
//! the engine and its clients observe them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Engine-level playback state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lifecycle state of a single sentence in the playlist
///
/// Legal transitions:
///
/// | from       | to                                 |
/// |------------|------------------------------------|
/// | Pending    | Preloading, Ready, Playing, Error  |
/// | Preloading | Ready, Pending, Error, Playing     |
/// | Ready      | Playing, Pending, Error            |
/// | Playing    | Played, Error, Ready               |
/// | Played     | Playing, Pending, Error            |
/// | Error      | Pending, Preloading, Playing       |
///
/// `Playing -> Ready` happens when a session is superseded or stopped before
/// its unit drained; the audio is still cached so the sentence is ready.
/// `Ready -> Error` and `Played -> Error` happen when cached audio turns out
/// to be undecodable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentenceState {
    #[default]
    Pending,
    Preloading,
    Ready,
    Playing,
    Played,
    Error,
}

impl SentenceState {
    /// Whether moving from `self` to `next` is a legal transition
    ///
    /// Staying in the same state is not a transition and returns false.
    pub fn can_transition_to(self, next: SentenceState) -> bool {
        use SentenceState::*;
        matches!(
            (self, next),
            (Pending, Preloading)
                | (Pending, Ready)
                | (Pending, Playing)
                | (Pending, Error)
                | (Preloading, Ready)
                | (Preloading, Pending)
                | (Preloading, Error)
                | (Preloading, Playing)
                | (Ready, Playing)
                | (Ready, Pending)
                | (Ready, Error)
                | (Playing, Played)
                | (Playing, Error)
                | (Playing, Ready)
                | (Played, Playing)
                | (Played, Pending)
                | (Played, Error)
                | (Error, Pending)
                | (Error, Preloading)
                | (Error, Playing)
        )
    }

    /// Audio for the sentence has been produced at least once
    pub fn has_audio(self) -> bool {
        matches!(
            self,
            SentenceState::Ready | SentenceState::Playing | SentenceState::Played
        )
    }
}

impl std::fmt::Display for SentenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SentenceState::Pending => "pending",
            SentenceState::Preloading => "preloading",
            SentenceState::Ready => "ready",
            SentenceState::Playing => "playing",
            SentenceState::Played => "played",
            SentenceState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Lectern event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LecternEvent {
    /// Engine playback state changed
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sentence moved between lifecycle states
    SentenceStateChanged {
        sentence_id: String,
        old_state: SentenceState,
        new_state: SentenceState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// First audible sample of a sentence was rendered
    SentenceStarted {
        sentence_id: String,
        sentence_index: usize,
        chapter_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sentence's playback unit drained completely
    SentenceCompleted {
        sentence_id: String,
        /// Output frames rendered from buffered audio
        samples_consumed: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audio for a sentence could not be produced
    ///
    /// Auto-advance halts; playing the same sentence again retries.
    SentenceFailed {
        sentence_id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback position within the current sentence
    PlaybackProgress {
        sentence_id: String,
        /// Fraction of buffered audio consumed (0.0..=1.0)
        progress: f64,
        read_pos: f64,
        write_pos: u64,
        samples_consumed: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new playlist was loaded
    PlaylistLoaded {
        book_id: String,
        sentence_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The last sentence of the playlist finished
    PlaybackFinished {
        book_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cached audio for a book was removed
    BookAudioDeleted {
        book_id: String,
        removed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl LecternEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            LecternEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            LecternEvent::SentenceStateChanged { .. } => "SentenceStateChanged",
            LecternEvent::SentenceStarted { .. } => "SentenceStarted",
            LecternEvent::SentenceCompleted { .. } => "SentenceCompleted",
            LecternEvent::SentenceFailed { .. } => "SentenceFailed",
            LecternEvent::PlaybackProgress { .. } => "PlaybackProgress",
            LecternEvent::PlaylistLoaded { .. } => "PlaylistLoaded",
            LecternEvent::PlaybackFinished { .. } => "PlaybackFinished",
            LecternEvent::BookAudioDeleted { .. } => "BookAudioDeleted",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a `tokio::sync::broadcast` channel. Slow subscribers lag and lose
/// the oldest events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LecternEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// ```
    /// use lectern_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LecternEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: LecternEvent,
    ) -> Result<usize, broadcast::error::SendError<LecternEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LecternEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
