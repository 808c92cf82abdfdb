//! Session coordinator - the playback engine's orchestration side
//!
//! **Module Structure:**
//! - `core.rs`: construction, shared accessors, renderer event loop
//! - `control.rs`: public operations (playlist, transport, voice, cache)
//! - `feed.rs`: producing a sentence's audio and feeding the renderer

mod control;
mod core;
mod feed;

pub use self::control::{SentenceStatus, SessionStatus, StatusReport};
pub use self::core::{CoordinatorParts, SessionCoordinator};
