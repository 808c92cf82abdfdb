//! Schema creation and default settings

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Create tables and indexes if missing
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audio_cache (
            key TEXT PRIMARY KEY,
            book_id TEXT NOT NULL,
            audio BLOB NOT NULL,
            size_bytes INTEGER NOT NULL,
            touched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audio_cache_touched ON audio_cache(touched_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audio_cache_book ON audio_cache(book_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert default values for settings that are missing
pub async fn init_settings_defaults(
    pool: &Pool<Sqlite>,
    voice: &str,
    speech_rate: f32,
) -> Result<()> {
    let speech_rate = speech_rate.to_string();
    let defaults = [
        ("voice", voice),
        ("speech_rate", speech_rate.as_str()),
        ("playback_rate", "1"),
    ];

    for (key, default_value) in defaults {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
            .bind(key)
            .fetch_one(pool)
            .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, settings};

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        init_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["audio_cache".to_string(), "settings".to_string()]);
    }

    #[tokio::test]
    async fn test_defaults_do_not_overwrite() {
        let pool = connect_in_memory().await.unwrap();
        settings::set_voice(&pool, "tenor").await.unwrap();

        init_settings_defaults(&pool, "alto", 1.25).await.unwrap();

        assert_eq!(settings::get_voice(&pool).await.unwrap().as_deref(), Some("tenor"));
        assert_eq!(settings::get_speech_rate(&pool).await.unwrap(), Some(1.25));
        assert_eq!(settings::get_playback_rate(&pool).await.unwrap(), Some(1.0));
    }
}
