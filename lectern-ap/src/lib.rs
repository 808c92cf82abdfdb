//! # Lectern Audio Player Library (lectern-ap)
//!
//! Streaming sentence playback for audiobook-style reading: sentences are
//! synthesized by a speech provider (on demand and ahead of the playhead),
//! cached, decoded and played gap-free through a real-time renderer.
//!
//! **Architecture:** orchestration on tokio (sessions, preloading, cache),
//! rendering in the cpal callback, connected by a lock-free command ring.
//! Decoding uses symphonia, resampling rubato.

pub mod api;
pub mod audio;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod state;
pub mod synthesis;

pub use error::{Error, Result};
pub use state::SharedState;
