//! # Lectern Common Library
//!
//! Shared code for the Lectern services including:
//! - Event types (LecternEvent enum) and the broadcast EventBus
//! - Sentence and playback state enums observed by clients
//! - Content-addressed cache key derivation
//! - Configuration file resolution

pub mod cache_key;
pub mod config;
pub mod error;
pub mod events;

pub use cache_key::{CacheKey, CacheKeyFields, KeyScope};
pub use error::{Error, Result};
pub use events::{EventBus, LecternEvent, PlaybackState, SentenceState};
