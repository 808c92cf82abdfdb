//! Cache storage contract shared by the SQLite and in-memory backends

use crate::error::Result;
use async_trait::async_trait;
use lectern_common::CacheKey;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

/// Entry count at which eviction triggers
pub const DEFAULT_CACHE_CAPACITY: usize = 5000;

/// Aggregate view of the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// A stored utterance
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub key: CacheKey,
    pub book_id: String,
    pub audio: Vec<u8>,
    /// Recency stamp after this read
    pub touched_at: i64,
}

/// Content-addressed audio storage with least-recently-used eviction
///
/// Reads refresh recency. When an insert of a new key finds the store at or
/// above capacity, the oldest tenth of entries (at least one) is removed
/// first, least recent first.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedAudio>>;

    /// Store `audio`, replacing any existing entry. Returns how many entries
    /// were evicted to make room.
    async fn put(&self, key: &CacheKey, book_id: &str, audio: &[u8]) -> Result<usize>;

    /// Remove one entry; true if it existed
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// Remove every entry for `book_id`; returns the number removed
    async fn delete_book(&self, book_id: &str) -> Result<u64>;

    async fn stats(&self) -> Result<CacheStats>;

    fn capacity(&self) -> usize;
}

/// Entries to evict from a full store holding `entries`
pub fn eviction_count(entries: usize) -> usize {
    (entries / 10).max(1)
}

/// Strictly increasing millisecond clock for recency stamps
///
/// Two touches in the same millisecond still get distinct, ordered stamps.
#[derive(Debug, Default)]
pub struct RecencyClock {
    last: AtomicI64,
}

impl RecencyClock {
    /// Start after `last`, typically the newest stamp already stored
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    pub fn tick(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_count() {
        assert_eq!(eviction_count(5000), 500);
        assert_eq!(eviction_count(5), 1);
        assert_eq!(eviction_count(0), 1);
    }

    #[test]
    fn test_clock_strictly_increases() {
        let clock = RecencyClock::default();
        let mut last = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_clock_continues_after_future_stamp() {
        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        let clock = RecencyClock::starting_after(future);
        assert_eq!(clock.tick(), future + 1);
    }
}
