//! HTTP server setup and routing
//!
//! Axum router for engine control, status and the SSE event stream.

use crate::error::{Error, Result};
use crate::playback::SessionCoordinator;
use crate::state::SharedState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub coordinator: Arc<SessionCoordinator>,
}

/// Build the router with every route attached
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Audio devices
        .route("/audio/devices", get(super::handlers::list_audio_devices))
        // Playlist
        .route("/playlist", post(super::handlers::load_playlist))
        // Playback control
        .route("/playback/play", post(super::handlers::play))
        .route("/playback/pause", post(super::handlers::pause))
        .route("/playback/resume", post(super::handlers::resume))
        .route("/playback/stop", post(super::handlers::stop))
        .route("/playback/next", post(super::handlers::skip_next))
        .route("/playback/previous", post(super::handlers::skip_previous))
        .route("/playback/retry", post(super::handlers::retry))
        .route("/playback/rate", post(super::handlers::set_playback_rate))
        .route("/playback/status", get(super::handlers::get_status))
        .route("/playback/position", get(super::handlers::get_position))
        // Synthesis settings
        .route("/synthesis/voice", post(super::handlers::set_voice))
        .route("/synthesis/speech_rate", post(super::handlers::set_speech_rate))
        // Sentences and cache
        .route("/sentences", get(super::handlers::get_sentences))
        .route("/cache/stats", get(super::handlers::get_cache_stats))
        .route("/cache/books/:book_id", delete(super::handlers::delete_book_audio))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run<F>(port: u16, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
