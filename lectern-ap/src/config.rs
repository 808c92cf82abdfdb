//! Configuration management for lectern-ap
//!
//! Two tiers:
//! 1. **TOML Bootstrap**: port, database path, logging, synthesis endpoint,
//!    cache, preload and audio device settings. Read once at startup.
//! 2. **Database Runtime**: voice, speech rate, playback rate and reading
//!    positions in the `settings` table. Changed through the API.
//!
//! Sources priority: command line, environment, TOML file, database, built-in
//! defaults.

use crate::db::settings;
use crate::error::{Error, Result};
use lectern_common::KeyScope;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to SQLite database file; OS data folder when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub preload: PreloadConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Speech provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// HTTP endpoint accepting `{text, voice, speed}` and returning encoded audio
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Voice used until one is stored in the database
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_rate")]
    pub speech_rate: f32,

    /// Per-request timeout for the provider
    #[serde(default = "default_synthesis_timeout_ms")]
    pub timeout_ms: u64,
}

/// Audio cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry count at which eviction triggers
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Round-trip timeout; a slower cache counts as a miss
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub key_scope: KeyScope,
}

/// Preload scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PreloadConfig {
    /// Sentences ahead of the playhead to keep synthesized
    #[serde(default = "default_preload_window")]
    pub window: usize,

    /// Queue depth cap
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Concurrent provider requests
    #[serde(default = "default_preload_workers")]
    pub workers: usize,
}

/// Audio output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Output device name; system default when absent
    #[serde(default)]
    pub device: Option<String>,

    /// Preferred engine sample rate; the device may force another
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Samples per chunk sent to the renderer
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,
}

fn default_port() -> u16 {
    5741
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_rate() -> f32 {
    1.0
}

fn default_synthesis_timeout_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CACHE_CAPACITY
}

fn default_cache_timeout_ms() -> u64 {
    5_000
}

fn default_preload_window() -> usize {
    5
}

fn default_max_queue_depth() -> usize {
    8
}

fn default_preload_workers() -> usize {
    1
}

fn default_sample_rate() -> u32 {
    crate::audio::types::DEFAULT_SAMPLE_RATE
}

fn default_chunk_samples() -> usize {
    4096
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            logging: LoggingConfig::default(),
            synthesis: SynthesisConfig::default(),
            cache: CacheConfig::default(),
            preload: PreloadConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            voice: default_voice(),
            speech_rate: default_rate(),
            timeout_ms: default_synthesis_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            timeout_ms: default_cache_timeout_ms(),
            key_scope: KeyScope::default(),
        }
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            window: default_preload_window(),
            max_queue_depth: default_max_queue_depth(),
            workers: default_preload_workers(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
            chunk_samples: default_chunk_samples(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let config: TomlConfig = lectern_common::config::load_toml(path)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".to_string()));
        }
        if self.preload.workers == 0 {
            return Err(Error::Config("preload.workers must be at least 1".to_string()));
        }
        if self.audio.chunk_samples == 0 {
            return Err(Error::Config("audio.chunk_samples must be at least 1".to_string()));
        }
        if !(self.synthesis.speech_rate.is_finite() && self.synthesis.speech_rate > 0.0) {
            return Err(Error::Config(format!(
                "synthesis.speech_rate must be positive, got {}",
                self.synthesis.speech_rate
            )));
        }
        Ok(())
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis.timeout_ms)
    }
}

/// Settings persisted in the database
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub voice: String,
    pub speech_rate: f32,
    pub playback_rate: f64,
}

impl RuntimeSettings {
    /// Built-in values seeded from the TOML file
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            voice: config.synthesis.voice.clone(),
            speech_rate: config.synthesis.speech_rate,
            playback_rate: 1.0,
        }
    }

    /// Read stored settings, falling back to `defaults` for missing values
    pub async fn load(pool: &SqlitePool, defaults: &RuntimeSettings) -> Result<Self> {
        let voice = settings::get_voice(pool)
            .await?
            .unwrap_or_else(|| defaults.voice.clone());
        let speech_rate = settings::get_speech_rate(pool)
            .await?
            .unwrap_or(defaults.speech_rate);
        let playback_rate = settings::get_playback_rate(pool)
            .await?
            .unwrap_or(defaults.playback_rate);

        if !(speech_rate.is_finite() && speech_rate > 0.0) {
            warn!("Stored speech_rate {} invalid, using {}", speech_rate, defaults.speech_rate);
            return Ok(Self {
                voice,
                speech_rate: defaults.speech_rate,
                playback_rate,
            });
        }

        Ok(Self {
            voice,
            speech_rate,
            playback_rate,
        })
    }
}
