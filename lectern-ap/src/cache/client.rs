//! Engine-facing cache client
//!
//! Every round trip is bounded by a timeout. A slow or failing cache is
//! treated as a miss (or an unsuccessful store) and logged; it never fails
//! playback. The client can also be built disabled, in which case every
//! lookup misses without touching a backend.

use crate::cache::store::{CacheStats, CacheStore};
use crate::error::Result;
use lectern_common::{CacheKey, CacheKeyFields, KeyScope};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything that identifies one cached utterance
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub book_id: String,
    pub chapter_id: String,
    pub sentence_id: String,
    pub text: String,
    pub voice: String,
    pub speech_rate: f32,
}

impl CacheRequest {
    pub fn key(&self, scope: KeyScope) -> CacheKey {
        CacheKey::derive(
            &CacheKeyFields {
                book_id: &self.book_id,
                chapter_id: &self.chapter_id,
                sentence_id: &self.sentence_id,
                text: &self.text,
                voice: &self.voice,
                speech_rate: self.speech_rate,
            },
            scope,
        )
    }
}

/// Result of `cache_audio`
#[derive(Debug, Clone, Serialize)]
pub struct CacheAudioResponse {
    pub success: bool,
    pub key: CacheKey,
}

/// Result of `get_cached_audio`; `audio` is `None` on a miss
#[derive(Debug, Clone)]
pub struct CachedAudioResponse {
    pub audio: Option<Vec<u8>>,
    pub key: CacheKey,
}

#[derive(Clone)]
pub struct CacheClient {
    store: Option<Arc<dyn CacheStore>>,
    timeout: Duration,
    key_scope: KeyScope,
}

impl CacheClient {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration, key_scope: KeyScope) -> Self {
        Self {
            store: Some(store),
            timeout,
            key_scope,
        }
    }

    /// Client whose lookups always miss
    pub fn disabled(key_scope: KeyScope) -> Self {
        Self {
            store: None,
            timeout: Duration::ZERO,
            key_scope,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn key_scope(&self) -> KeyScope {
        self.key_scope
    }

    pub fn key_for(&self, request: &CacheRequest) -> CacheKey {
        request.key(self.key_scope)
    }

    pub async fn cache_audio(&self, request: &CacheRequest, audio: &[u8]) -> CacheAudioResponse {
        let key = self.key_for(request);
        let Some(store) = &self.store else {
            return CacheAudioResponse { success: false, key };
        };

        let stored = self
            .round_trip("store", store.put(&key, &request.book_id, audio))
            .await;

        if let Some(evicted) = stored {
            if evicted > 0 {
                debug!("Storing {} evicted {} entries", key, evicted);
            }
        }

        CacheAudioResponse {
            success: stored.is_some(),
            key,
        }
    }

    pub async fn get_cached_audio(&self, request: &CacheRequest) -> CachedAudioResponse {
        let key = self.key_for(request);
        let Some(store) = &self.store else {
            return CachedAudioResponse { audio: None, key };
        };

        let audio = self
            .round_trip("lookup", store.get(&key))
            .await
            .flatten()
            .map(|hit| hit.audio);

        debug!(
            "Cache {} for sentence {}",
            if audio.is_some() { "hit" } else { "miss" },
            request.sentence_id
        );
        CachedAudioResponse { audio, key }
    }

    /// Drop one entry whose bytes turned out to be unusable
    pub async fn evict_cached_audio(&self, request: &CacheRequest) -> bool {
        let key = self.key_for(request);
        let Some(store) = &self.store else {
            return false;
        };

        let removed = self
            .round_trip("evict", store.remove(&key))
            .await
            .unwrap_or(false);
        if removed {
            debug!("Evicted unusable entry {} for sentence {}", key, request.sentence_id);
        }
        removed
    }

    /// Remove all audio for `book_id`; true if anything was removed
    pub async fn delete_book_audio(&self, book_id: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        self.round_trip("delete", store.delete_book(book_id))
            .await
            .is_some_and(|removed| removed > 0)
    }

    /// Cache totals; zeros when disabled or unreachable
    pub async fn get_cache_stats(&self) -> CacheStats {
        let Some(store) = &self.store else {
            return CacheStats::default();
        };

        self.round_trip("stats", store.stats())
            .await
            .unwrap_or_default()
    }

    async fn round_trip<T, F>(&self, operation: &'static str, future: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Cache {} failed: {}", operation, e);
                None
            }
            Err(_) => {
                warn!("Cache {} timed out after {:?}", operation, self.timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::cache::store::CachedAudio;
    use crate::error::Error;
    use async_trait::async_trait;

    /// Backend that answers every call after `delay`
    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl CacheStore for SlowStore {
        async fn get(&self, key: &CacheKey) -> Result<Option<CachedAudio>> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(CachedAudio {
                key: key.clone(),
                book_id: "book".to_string(),
                audio: b"RIFF".to_vec(),
                touched_at: 0,
            }))
        }

        async fn put(&self, _key: &CacheKey, _book_id: &str, _audio: &[u8]) -> Result<usize> {
            tokio::time::sleep(self.delay).await;
            Ok(0)
        }

        async fn remove(&self, _key: &CacheKey) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            Ok(true)
        }

        async fn delete_book(&self, _book_id: &str) -> Result<u64> {
            tokio::time::sleep(self.delay).await;
            Ok(1)
        }

        async fn stats(&self) -> Result<CacheStats> {
            tokio::time::sleep(self.delay).await;
            Ok(CacheStats { entries: 1, total_bytes: 4 })
        }

        fn capacity(&self) -> usize {
            100
        }
    }

    /// Backend whose every call fails
    struct FailingStore;

    fn backend_down() -> Error {
        Error::Internal("backend unavailable".to_string())
    }

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CachedAudio>> {
            Err(backend_down())
        }

        async fn put(&self, _key: &CacheKey, _book_id: &str, _audio: &[u8]) -> Result<usize> {
            Err(backend_down())
        }

        async fn remove(&self, _key: &CacheKey) -> Result<bool> {
            Err(backend_down())
        }

        async fn delete_book(&self, _book_id: &str) -> Result<u64> {
            Err(backend_down())
        }

        async fn stats(&self) -> Result<CacheStats> {
            Err(backend_down())
        }

        fn capacity(&self) -> usize {
            100
        }
    }

    fn request(sentence_id: &str) -> CacheRequest {
        CacheRequest {
            book_id: "book".to_string(),
            chapter_id: "c1".to_string(),
            sentence_id: sentence_id.to_string(),
            text: "Call me Ishmael.".to_string(),
            voice: "alto".to_string(),
            speech_rate: 1.0,
        }
    }

    fn client() -> CacheClient {
        CacheClient::new(
            Arc::new(MemoryCacheStore::new(100)),
            Duration::from_secs(5),
            KeyScope::Sentence,
        )
    }

    #[tokio::test]
    async fn test_store_then_hit() {
        let client = client();
        let stored = client.cache_audio(&request("s1"), b"RIFF").await;
        assert!(stored.success);

        let hit = client.get_cached_audio(&request("s1")).await;
        assert_eq!(hit.audio.as_deref(), Some(&b"RIFF"[..]));
        assert_eq!(hit.key, stored.key);

        assert!(client.get_cached_audio(&request("s2")).await.audio.is_none());
    }

    #[tokio::test]
    async fn test_disabled_always_misses() {
        let client = CacheClient::disabled(KeyScope::Sentence);
        assert!(!client.cache_audio(&request("s1"), b"x").await.success);
        assert!(client.get_cached_audio(&request("s1")).await.audio.is_none());
        assert!(!client.delete_book_audio("book").await);
        assert_eq!(client.get_cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_delete_book_reports_removal() {
        let client = client();
        client.cache_audio(&request("s1"), b"x").await;
        assert!(client.delete_book_audio("book").await);
        assert!(!client.delete_book_audio("book").await);
    }

    #[tokio::test]
    async fn test_evict_removes_only_that_entry() {
        let client = client();
        client.cache_audio(&request("s1"), b"bad").await;
        client.cache_audio(&request("s2"), b"good").await;

        assert!(client.evict_cached_audio(&request("s1")).await);
        assert!(!client.evict_cached_audio(&request("s1")).await);
        assert!(client.get_cached_audio(&request("s1")).await.audio.is_none());
        assert!(client.get_cached_audio(&request("s2")).await.audio.is_some());
    }

    #[tokio::test]
    async fn test_slow_backend_treated_as_miss() {
        let client = CacheClient::new(
            Arc::new(SlowStore { delay: Duration::from_secs(10) }),
            Duration::from_millis(50),
            KeyScope::Sentence,
        );

        let hit = client.get_cached_audio(&request("s1")).await;
        assert_eq!(hit.audio, None);
        assert_eq!(hit.key, request("s1").key(KeyScope::Sentence));

        let stored = client.cache_audio(&request("s1"), b"RIFF").await;
        assert!(!stored.success);
        assert!(!client.evict_cached_audio(&request("s1")).await);
        assert!(!client.delete_book_audio("book").await);
        assert_eq!(client.get_cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_fast_enough_backend_still_answers() {
        let client = CacheClient::new(
            Arc::new(SlowStore { delay: Duration::from_millis(10) }),
            Duration::from_secs(2),
            KeyScope::Sentence,
        );

        assert_eq!(
            client.get_cached_audio(&request("s1")).await.audio.as_deref(),
            Some(&b"RIFF"[..])
        );
        assert!(client.cache_audio(&request("s1"), b"RIFF").await.success);
    }

    #[tokio::test]
    async fn test_backend_error_treated_as_miss() {
        let client = CacheClient::new(Arc::new(FailingStore), Duration::from_secs(5), KeyScope::Sentence);

        assert_eq!(client.get_cached_audio(&request("s1")).await.audio, None);
        assert!(!client.cache_audio(&request("s1"), b"RIFF").await.success);
        assert!(!client.evict_cached_audio(&request("s1")).await);
        assert!(!client.delete_book_audio("book").await);
        assert_eq!(client.get_cache_stats().await, CacheStats::default());
    }
}
