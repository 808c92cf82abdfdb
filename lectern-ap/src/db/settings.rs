//! Settings database access
//!
//! Key-value rows in the `settings` table: voice, speech rate, playback
//! rate and one reading position per book.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

const READING_POSITION_PREFIX: &str = "reading_position:";

/// Last sentence started in a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPosition {
    pub sentence_id: String,
    pub sentence_index: usize,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub async fn get_voice(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "voice").await
}

pub async fn set_voice(db: &Pool<Sqlite>, voice: &str) -> Result<()> {
    set_setting(db, "voice", voice).await
}

pub async fn get_speech_rate(db: &Pool<Sqlite>) -> Result<Option<f32>> {
    get_setting::<f32>(db, "speech_rate").await
}

pub async fn set_speech_rate(db: &Pool<Sqlite>, rate: f32) -> Result<()> {
    set_setting(db, "speech_rate", rate).await
}

pub async fn get_playback_rate(db: &Pool<Sqlite>) -> Result<Option<f64>> {
    get_setting::<f64>(db, "playback_rate").await
}

pub async fn set_playback_rate(db: &Pool<Sqlite>, rate: f64) -> Result<()> {
    set_setting(db, "playback_rate", rate).await
}

pub async fn save_reading_position(
    db: &Pool<Sqlite>,
    book_id: &str,
    sentence_id: &str,
    sentence_index: usize,
) -> Result<()> {
    let position = ReadingPosition {
        sentence_id: sentence_id.to_string(),
        sentence_index,
        updated_at: chrono::Utc::now(),
    };
    let json = serde_json::to_string(&position)
        .map_err(|e| Error::Internal(format!("Failed to encode reading position: {}", e)))?;
    set_setting(db, &format!("{}{}", READING_POSITION_PREFIX, book_id), json).await
}

pub async fn load_reading_position(
    db: &Pool<Sqlite>,
    book_id: &str,
) -> Result<Option<ReadingPosition>> {
    let key = format!("{}{}", READING_POSITION_PREFIX, book_id);
    let value: Option<String> = get_setting(db, &key).await?;

    value
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| Error::Config(format!("Invalid reading position for '{}': {}", book_id, e)))
        })
        .transpose()
}

/// Generic setting getter; NULL and missing rows read as `None`
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
            Error::Config(format!("Failed to parse setting '{}' value: {}", key, s))
        }),
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let pool = connect_in_memory().await.unwrap();
        assert_eq!(get_voice(&pool).await.unwrap(), None);
        assert_eq!(get_playback_rate(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let pool = connect_in_memory().await.unwrap();
        set_voice(&pool, "alto").await.unwrap();
        set_speech_rate(&pool, 1.1).await.unwrap();
        set_playback_rate(&pool, 1.5).await.unwrap();
        set_voice(&pool, "tenor").await.unwrap();

        assert_eq!(get_voice(&pool).await.unwrap().as_deref(), Some("tenor"));
        assert_eq!(get_speech_rate(&pool).await.unwrap(), Some(1.1));
        assert_eq!(get_playback_rate(&pool).await.unwrap(), Some(1.5));
    }

    #[tokio::test]
    async fn test_unparseable_value_is_config_error() {
        let pool = connect_in_memory().await.unwrap();
        set_setting(&pool, "playback_rate", "fast").await.unwrap();
        assert!(matches!(get_playback_rate(&pool).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_reading_position_per_book() {
        let pool = connect_in_memory().await.unwrap();
        save_reading_position(&pool, "book-a", "s7", 7).await.unwrap();
        save_reading_position(&pool, "book-b", "s2", 2).await.unwrap();
        save_reading_position(&pool, "book-a", "s8", 8).await.unwrap();

        let a = load_reading_position(&pool, "book-a").await.unwrap().unwrap();
        assert_eq!((a.sentence_id.as_str(), a.sentence_index), ("s8", 8));
        let b = load_reading_position(&pool, "book-b").await.unwrap().unwrap();
        assert_eq!(b.sentence_index, 2);
        assert!(load_reading_position(&pool, "book-c").await.unwrap().is_none());
    }
}
