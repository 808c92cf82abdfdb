//! In-process cache backend
//!
//! Used when no database is available and in tests. Reads only take the
//! read lock; recency is bumped through a per-entry atomic.

use crate::cache::store::{eviction_count, CacheStats, CacheStore, CachedAudio, RecencyClock};
use crate::error::Result;
use async_trait::async_trait;
use lectern_common::CacheKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct MemoryEntry {
    book_id: String,
    audio: Arc<Vec<u8>>,
    touched_at: AtomicI64,
}

pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, MemoryEntry>>,
    clock: RecencyClock,
    capacity: usize,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock: RecencyClock::default(),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedAudio>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|entry| {
            let touched_at = self.clock.tick();
            entry.touched_at.store(touched_at, Ordering::Relaxed);
            CachedAudio {
                key: key.clone(),
                book_id: entry.book_id.clone(),
                audio: entry.audio.as_ref().clone(),
                touched_at,
            }
        }))
    }

    async fn put(&self, key: &CacheKey, book_id: &str, audio: &[u8]) -> Result<usize> {
        let mut entries = self.entries.write().await;

        let mut evicted = 0;
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let mut by_age: Vec<(i64, CacheKey)> = entries
                .iter()
                .map(|(k, e)| (e.touched_at.load(Ordering::Relaxed), k.clone()))
                .collect();
            by_age.sort_unstable();

            for (_, old_key) in by_age.into_iter().take(eviction_count(entries.len())) {
                entries.remove(&old_key);
                evicted += 1;
            }
            debug!("Evicted {} cache entries", evicted);
        }

        entries.insert(
            key.clone(),
            MemoryEntry {
                book_id: book_id.to_string(),
                audio: Arc::new(audio.to_vec()),
                touched_at: AtomicI64::new(self.clock.tick()),
            },
        );
        Ok(evicted)
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_book(&self, book_id: &str) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.book_id != book_id);
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.read().await;
        Ok(CacheStats {
            entries: entries.len() as u64,
            total_bytes: entries.values().map(|e| e.audio.len() as u64).sum(),
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> CacheKey {
        CacheKey::from_stored(format!("{:064x}", i))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryCacheStore::new(10);
        store.put(&key(1), "book", &[1, 2, 3]).await.unwrap();

        let hit = store.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(hit.audio, vec![1, 2, 3]);
        assert_eq!(hit.book_id, "book");
        assert!(store.get(&key(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eviction_spares_recently_read() {
        let store = MemoryCacheStore::new(10);
        for i in 0..10 {
            store.put(&key(i), "book", &[i as u8]).await.unwrap();
        }
        store.get(&key(0)).await.unwrap();

        let evicted = store.put(&key(10), "book", &[10]).await.unwrap();

        assert_eq!(evicted, 1);
        assert!(store.get(&key(0)).await.unwrap().is_some());
        assert!(store.get(&key(1)).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().entries, 10);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let store = MemoryCacheStore::new(2);
        store.put(&key(1), "book", &[1]).await.unwrap();
        store.put(&key(2), "book", &[2]).await.unwrap();

        assert_eq!(store.put(&key(1), "book", &[9, 9]).await.unwrap(), 0);
        assert_eq!(store.get(&key(1)).await.unwrap().unwrap().audio, vec![9, 9]);
        assert_eq!(
            store.stats().await.unwrap(),
            CacheStats { entries: 2, total_bytes: 3 }
        );
    }

    #[tokio::test]
    async fn test_delete_book_only_removes_that_book() {
        let store = MemoryCacheStore::new(10);
        store.put(&key(1), "a", &[1]).await.unwrap();
        store.put(&key(2), "b", &[2]).await.unwrap();
        store.put(&key(3), "a", &[3]).await.unwrap();

        assert_eq!(store.delete_book("a").await.unwrap(), 2);
        assert_eq!(store.delete_book("a").await.unwrap(), 0);
        assert!(store.get(&key(2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_single_entry() {
        let store = MemoryCacheStore::new(10);
        store.put(&key(1), "book", &[1]).await.unwrap();
        store.put(&key(2), "book", &[2]).await.unwrap();

        assert!(store.remove(&key(1)).await.unwrap());
        assert!(!store.remove(&key(1)).await.unwrap());
        assert!(store.get(&key(1)).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().entries, 1);
    }
}
