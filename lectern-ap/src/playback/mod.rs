//! Playback engine: streaming buffer, renderer, preloading and sessions

pub mod coordinator;
pub mod playlist;
pub mod preload;
pub mod preload_queue;
pub mod renderer;
pub mod sentence_state;
pub mod session;
pub mod streaming_buffer;

pub use coordinator::{CoordinatorParts, SessionCoordinator, SentenceStatus, StatusReport};
pub use playlist::{Playlist, Sentence, SynthesisParams};
pub use preload::{PreloadScheduler, PreloadStatus};
pub use renderer::{renderer_channel, Renderer, RendererEvent, RendererHandle};
pub use sentence_state::SentenceStateTracker;
pub use session::{SessionPhase, SessionSlot, SessionToken, StartOutcome};
pub use streaming_buffer::{StreamingPlaybackBuffer, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
