//! SQLite cache backend
//!
//! Rows live in `audio_cache`. Mutations are serialized behind one async
//! lock so the count-then-evict-then-insert sequence of `put` cannot
//! interleave with another writer. Reads only hold the lock-free pool.

use crate::cache::store::{eviction_count, CacheStats, CacheStore, CachedAudio, RecencyClock};
use crate::error::Result;
use async_trait::async_trait;
use lectern_common::CacheKey;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

pub struct SqliteCacheStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    clock: RecencyClock,
    capacity: usize,
}

impl SqliteCacheStore {
    /// Open over a pool whose schema is already initialized
    ///
    /// The recency clock resumes after the newest stored stamp so ordering
    /// survives restarts.
    pub async fn new(pool: SqlitePool, capacity: usize) -> Result<Self> {
        let newest: Option<i64> = sqlx::query_scalar("SELECT MAX(touched_at) FROM audio_cache")
            .fetch_one(&pool)
            .await?;

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
            clock: RecencyClock::starting_after(newest.unwrap_or(0)),
            capacity: capacity.max(1),
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedAudio>> {
        let row: Option<(String, Vec<u8>)> =
            sqlx::query_as("SELECT book_id, audio FROM audio_cache WHERE key = ?")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let Some((book_id, audio)) = row else {
            return Ok(None);
        };

        let touched_at = self.clock.tick();
        sqlx::query("UPDATE audio_cache SET touched_at = ? WHERE key = ?")
            .bind(touched_at)
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        Ok(Some(CachedAudio {
            key: key.clone(),
            book_id,
            audio,
            touched_at,
        }))
    }

    async fn put(&self, key: &CacheKey, book_id: &str, audio: &[u8]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM audio_cache WHERE key = ?)")
            .bind(key.as_str())
            .fetch_one(&mut *tx)
            .await?;

        let mut evicted = 0;
        if !exists {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audio_cache")
                .fetch_one(&mut *tx)
                .await?;

            if count as usize >= self.capacity {
                let limit = eviction_count(count as usize) as i64;
                let result = sqlx::query(
                    r#"
                    DELETE FROM audio_cache WHERE key IN (
                        SELECT key FROM audio_cache ORDER BY touched_at ASC LIMIT ?
                    )
                    "#,
                )
                .bind(limit)
                .execute(&mut *tx)
                .await?;
                evicted = result.rows_affected() as usize;
                debug!("Evicted {} cache entries", evicted);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO audio_cache (key, book_id, audio, size_bytes, touched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                book_id = excluded.book_id,
                audio = excluded.audio,
                size_bytes = excluded.size_bytes,
                touched_at = excluded.touched_at
            "#,
        )
        .bind(key.as_str())
        .bind(book_id)
        .bind(audio)
        .bind(audio.len() as i64)
        .bind(self.clock.tick())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(evicted)
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM audio_cache WHERE key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_book(&self, book_id: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM audio_cache WHERE book_id = ?")
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let (entries, total_bytes): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM audio_cache")
                .fetch_one(&self.pool)
                .await?;

        Ok(CacheStats {
            entries: entries.max(0) as u64,
            total_bytes: total_bytes.max(0) as u64,
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
