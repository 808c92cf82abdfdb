//! Persistent audio cache for synthesized sentences
//!
//! Keys are content hashes (see `lectern_common::cache_key`). The engine
//! talks to a [`CacheClient`], which wraps a [`CacheStore`] backend with a
//! timeout so cache trouble degrades to a miss.

pub mod client;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use client::{CacheAudioResponse, CacheClient, CacheRequest, CachedAudioResponse};
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use store::{CacheStats, CacheStore, CachedAudio, DEFAULT_CACHE_CAPACITY};
