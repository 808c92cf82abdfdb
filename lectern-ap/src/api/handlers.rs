//! HTTP request handlers
//!
//! Thin wrappers over [`SessionCoordinator`](crate::playback::SessionCoordinator)
//! operations. Engine errors map to status codes in [`error_response`].

use crate::api::server::AppContext;
use crate::cache::CacheStats;
use crate::error::Error;
use crate::playback::{Playlist, SentenceStatus, StatusReport};
use crate::state::PositionSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lectern_common::PlaybackState;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
    playback_state: PlaybackState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PlaylistResponse {
    book_id: String,
    sentence_count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    sentence_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    sentence_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    status: String,
    session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackRateRequest {
    rate: f64,
}

#[derive(Debug, Serialize)]
pub struct PlaybackRateResponse {
    playback_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    voice: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRateRequest {
    speech_rate: f32,
}

#[derive(Debug, Serialize)]
pub struct SentencesResponse {
    book_id: String,
    sentences: Vec<SentenceStatus>,
}

#[derive(Debug, Serialize)]
pub struct DeleteBookResponse {
    book_id: String,
    removed: bool,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Map an engine error to an HTTP status
fn error_response(e: Error) -> ApiError {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }

    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health and devices
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "lectern-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        playback_state: ctx.state.get_playback_state().await,
    })
}

/// GET /audio/devices
pub async fn list_audio_devices() -> ApiResult<DeviceListResponse> {
    use crate::audio::output::AudioOutput;

    let devices = AudioOutput::list_devices().map_err(error_response)?;
    info!("Found {} audio devices", devices.len());
    Ok(Json(DeviceListResponse { devices }))
}

// ============================================================================
// Playlist and transport
// ============================================================================

/// POST /playlist
pub async fn load_playlist(
    State(ctx): State<AppContext>,
    Json(playlist): Json<Playlist>,
) -> ApiResult<PlaylistResponse> {
    let book_id = playlist.book_id.clone();
    let sentence_count = ctx
        .coordinator
        .load_playlist(playlist)
        .await
        .map_err(error_response)?;
    Ok(Json(PlaylistResponse {
        book_id,
        sentence_count,
    }))
}

/// POST /playback/play; body `{"sentence_id": ...}` is optional
pub async fn play(
    State(ctx): State<AppContext>,
    request: Option<Json<PlayRequest>>,
) -> ApiResult<SessionResponse> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let session_id = ctx
        .coordinator
        .play(request.sentence_id.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(SessionResponse {
        status: "playing".to_string(),
        session_id,
    }))
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.coordinator.pause().await.map_err(error_response)?;
    Ok(ok())
}

/// POST /playback/resume
pub async fn resume(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.coordinator.resume().await.map_err(error_response)?;
    Ok(ok())
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.coordinator.stop().await.map_err(error_response)?;
    Ok(ok())
}

/// POST /playback/next
pub async fn skip_next(State(ctx): State<AppContext>) -> ApiResult<SessionResponse> {
    let session_id = ctx.coordinator.skip_next().await.map_err(error_response)?;
    Ok(Json(SessionResponse {
        status: "skipped".to_string(),
        session_id,
    }))
}

/// POST /playback/previous
pub async fn skip_previous(State(ctx): State<AppContext>) -> ApiResult<SessionResponse> {
    let session_id = ctx
        .coordinator
        .skip_previous()
        .await
        .map_err(error_response)?;
    Ok(Json(SessionResponse {
        status: "skipped".to_string(),
        session_id,
    }))
}

/// POST /playback/retry
pub async fn retry(
    State(ctx): State<AppContext>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<SessionResponse> {
    let session_id = ctx
        .coordinator
        .retry(&request.sentence_id)
        .await
        .map_err(error_response)?;
    Ok(Json(SessionResponse {
        status: "retrying".to_string(),
        session_id,
    }))
}

/// POST /playback/rate; out-of-range rates are clamped
pub async fn set_playback_rate(
    State(ctx): State<AppContext>,
    Json(request): Json<PlaybackRateRequest>,
) -> ApiResult<PlaybackRateResponse> {
    let playback_rate = ctx
        .coordinator
        .set_playback_rate(request.rate)
        .await
        .map_err(error_response)?;
    Ok(Json(PlaybackRateResponse { playback_rate }))
}

/// GET /playback/status
pub async fn get_status(State(ctx): State<AppContext>) -> Json<StatusReport> {
    Json(ctx.coordinator.status().await)
}

/// GET /playback/position
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionSnapshot> {
    Json(ctx.state.live_position.current())
}

// ============================================================================
// Synthesis settings
// ============================================================================

/// POST /synthesis/voice
pub async fn set_voice(
    State(ctx): State<AppContext>,
    Json(request): Json<VoiceRequest>,
) -> ApiResult<StatusResponse> {
    ctx.coordinator
        .set_voice(&request.voice)
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// POST /synthesis/speech_rate
pub async fn set_speech_rate(
    State(ctx): State<AppContext>,
    Json(request): Json<SpeechRateRequest>,
) -> ApiResult<StatusResponse> {
    ctx.coordinator
        .set_speech_rate(request.speech_rate)
        .await
        .map_err(error_response)?;
    Ok(ok())
}

// ============================================================================
// Sentences and cache
// ============================================================================

/// GET /sentences
pub async fn get_sentences(State(ctx): State<AppContext>) -> Json<SentencesResponse> {
    let book_id = ctx.coordinator.playlist().await.book_id.clone();
    Json(SentencesResponse {
        book_id,
        sentences: ctx.coordinator.sentence_statuses().await,
    })
}

/// GET /cache/stats
pub async fn get_cache_stats(State(ctx): State<AppContext>) -> Json<CacheStats> {
    Json(ctx.coordinator.cache_stats().await)
}

/// DELETE /cache/books/:book_id
pub async fn delete_book_audio(
    State(ctx): State<AppContext>,
    Path(book_id): Path<String>,
) -> Json<DeleteBookResponse> {
    let removed = ctx.coordinator.delete_book_audio(&book_id).await;
    Json(DeleteBookResponse { book_id, removed })
}
