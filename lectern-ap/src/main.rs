//! Lectern Audio Player (lectern-ap) - Main entry point
//!
//! Loads configuration, opens the database and audio device, starts the
//! session coordinator and serves the HTTP/SSE control interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lectern_ap::api::{self, AppContext};
use lectern_ap::audio::AudioOutput;
use lectern_ap::cache::{CacheClient, SqliteCacheStore};
use lectern_ap::config::{RuntimeSettings, TomlConfig};
use lectern_ap::db;
use lectern_ap::playback::{CoordinatorParts, SessionCoordinator};
use lectern_ap::state::SharedState;
use lectern_ap::synthesis::{HttpSynthesizer, SpeechSynthesizer, UnconfiguredSynthesizer};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lectern-ap
#[derive(Parser, Debug)]
#[command(name = "lectern-ap")]
#[command(about = "Streaming sentence playback engine")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "LECTERN_PORT")]
    port: Option<u16>,

    /// Configuration file (also LECTERN_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "LECTERN_DATABASE")]
    database: Option<PathBuf>,

    /// Speech provider endpoint
    #[arg(long, env = "LECTERN_SYNTH_URL")]
    synth_url: Option<String>,

    /// Audio output device name
    #[arg(long)]
    device: Option<String>,

    /// Print available audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn default_filter(level: &str) -> tracing_subscriber::EnvFilter {
    format!("lectern_ap={level},lectern_common={level},tower_http=debug").into()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG wins over the configured level, which is
    // applied once the config file has been read
    let from_env = tracing_subscriber::EnvFilter::try_from_default_env().ok();
    let level_from_env = from_env.is_some();
    let (filter, filter_handle) = tracing_subscriber::reload::Layer::new(
        from_env.unwrap_or_else(|| default_filter("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        lectern_common::config::resolve_config_path(args.config.as_deref(), "LECTERN_CONFIG");
    let config = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    if !level_from_env {
        filter_handle
            .reload(default_filter(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    if args.list_devices {
        for device in AudioOutput::list_devices().context("Failed to list audio devices")? {
            println!("{}", device);
        }
        return Ok(());
    }

    info!(
        "Starting Lectern Audio Player {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    // Database
    let database_path = args
        .database
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(lectern_common::config::default_database_path);
    let pool = db::connect(&database_path)
        .await
        .context("Failed to open database")?;

    let defaults = RuntimeSettings::from_toml(&config);
    db::init::init_settings_defaults(&pool, &defaults.voice, defaults.speech_rate)
        .await
        .context("Failed to seed settings")?;
    let settings = RuntimeSettings::load(&pool, &defaults)
        .await
        .context("Failed to load runtime settings")?;

    // Audio cache; an unusable backend disables caching for this run
    let cache = if config.cache.enabled {
        match SqliteCacheStore::new(pool.clone(), config.cache.capacity).await {
            Ok(store) => CacheClient::new(
                Arc::new(store),
                config.cache_timeout(),
                config.cache.key_scope,
            ),
            Err(e) => {
                warn!("Audio cache unavailable, continuing without it: {}", e);
                CacheClient::disabled(config.cache.key_scope)
            }
        }
    } else {
        info!("Audio cache disabled by configuration");
        CacheClient::disabled(config.cache.key_scope)
    };

    // Speech provider
    let endpoint = args.synth_url.clone().or_else(|| config.synthesis.endpoint.clone());
    let synthesizer: Arc<dyn SpeechSynthesizer> = match endpoint {
        Some(endpoint) => Arc::new(
            HttpSynthesizer::new(endpoint, config.synthesis_timeout())
                .context("Failed to create speech provider client")?,
        ),
        None => {
            warn!("No speech provider endpoint configured; synthesis will fail");
            Arc::new(UnconfiguredSynthesizer)
        }
    };

    // Audio output; the engine runs at the device rate
    let device = args.device.clone().or_else(|| config.audio.device.clone());
    let mut output = AudioOutput::new(device.as_deref(), config.audio.sample_rate)
        .context("Failed to open audio output")?;

    let state = Arc::new(SharedState::new());
    let (coordinator, renderer) = SessionCoordinator::start(CoordinatorParts {
        state: Arc::clone(&state),
        db: pool.clone(),
        cache,
        synthesizer,
        settings,
        preload: config.preload.clone(),
        sample_rate: output.sample_rate(),
        chunk_samples: config.audio.chunk_samples,
    });

    output
        .start(renderer)
        .context("Failed to start audio stream")?;
    info!(
        "Audio output on '{}' at {} Hz, {} channel(s)",
        output.device_name(),
        output.sample_rate(),
        output.channels()
    );

    let ctx = AppContext {
        state,
        coordinator: Arc::clone(&coordinator),
    };
    let port = args.port.unwrap_or(config.port);
    let served = api::run(port, ctx, shutdown_signal()).await;

    coordinator.shutdown().await;
    output.stop();
    pool.close().await;

    served.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
