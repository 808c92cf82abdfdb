//! Public operations of the session coordinator
//!
//! Transport (play, pause, resume, stop, skip), playlist loading, voice and
//! rate changes, cache maintenance and status reporting.

use super::core::SessionCoordinator;
use crate::cache::CacheStats;
use crate::db::settings;
use crate::error::{Error, Result};
use crate::playback::playlist::Playlist;
use crate::playback::preload::PreloadStatus;
use crate::playback::session::SessionPhase;
use crate::playback::streaming_buffer::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use crate::state::PositionSnapshot;
use lectern_common::{LecternEvent, PlaybackState, SentenceState};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Current session as reported to observers
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub sentence_id: String,
    pub sentence_index: usize,
    pub chapter_index: usize,
    pub phase: SessionPhase,
    pub is_paused: bool,
}

/// Engine snapshot for `GET /playback/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub playback_state: PlaybackState,
    pub book_id: String,
    pub sentence_count: usize,
    pub session: Option<SessionStatus>,
    pub position: PositionSnapshot,
    pub voice: String,
    pub speech_rate: f32,
    pub playback_rate: f64,
    pub preload: PreloadStatus,
    pub cache_enabled: bool,
    pub synthesizer: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SentenceStatus {
    pub index: usize,
    pub id: String,
    pub chapter_index: usize,
    pub state: SentenceState,
}

impl SessionCoordinator {
    /// Replace the playlist. Stops playback; every sentence starts `Pending`.
    pub async fn load_playlist(&self, playlist: Playlist) -> Result<usize> {
        playlist.validate().map_err(Error::BadRequest)?;
        info!(
            "Loading book {} with {} sentences",
            playlist.book_id,
            playlist.len()
        );

        self.stop().await?;

        let playlist = Arc::new(playlist);
        self.sentences.load(playlist.ids()).await;
        *self.playlist.write().await = Arc::clone(&playlist);
        self.scheduler.set_playlist(Arc::clone(&playlist)).await;

        self.state.broadcast_event(LecternEvent::PlaylistLoaded {
            book_id: playlist.book_id.clone(),
            sentence_count: playlist.len(),
            timestamp: chrono::Utc::now(),
        });
        Ok(playlist.len())
    }

    /// Play `sentence_id`, or continue where the listener left off.
    ///
    /// Without an id a paused session resumes, a live one is kept, and
    /// otherwise playback starts at the saved reading position. Playing a
    /// sentence in `Error` retries it. Returns the session id.
    pub async fn play(self: &Arc<Self>, sentence_id: Option<&str>) -> Result<Uuid> {
        info!("Play command received");
        let playlist = self.playlist().await;
        if playlist.is_empty() {
            return Err(Error::InvalidState("no playlist loaded".to_string()));
        }

        let index = match sentence_id {
            Some(id) => playlist
                .index_of(id)
                .ok_or_else(|| Error::NotFound(format!("sentence '{}'", id)))?,
            None => {
                if let Some(session_id) = self.live_session_id().await {
                    self.resume_renderer().await;
                    return Ok(session_id);
                }
                self.resume_index(&playlist).await
            }
        };

        self.resume_renderer().await;
        self.jump_to(index).await
    }

    pub async fn pause(&self) -> Result<()> {
        info!("Pause command received");
        match self.state.get_playback_state().await {
            PlaybackState::Paused => return Ok(()),
            PlaybackState::Stopped => {
                return Err(Error::InvalidState("playback is stopped".to_string()))
            }
            PlaybackState::Playing => {}
        }

        {
            let mut slot = self.session.lock().await;
            slot.set_paused(true);
            self.lock_renderer().pause();
        }
        self.state.set_playback_state(PlaybackState::Paused).await;
        Ok(())
    }

    /// Resume a paused session; from stopped this behaves like `play(None)`
    pub async fn resume(self: &Arc<Self>) -> Result<()> {
        info!("Resume command received");
        match self.state.get_playback_state().await {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.resume_renderer().await;
                Ok(())
            }
            PlaybackState::Stopped => self.play(None).await.map(|_| ()),
        }
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stop command received");
        let ended = {
            let mut slot = self.session.lock().await;
            let ended = slot.end();
            self.lock_renderer().reset();
            ended
        };

        if let Some(session) = ended {
            self.sentences
                .transition_if(&session.sentence_id, &[SentenceState::Playing], SentenceState::Ready)
                .await;
        }
        self.scheduler.stop().await;
        self.state.live_position.clear();
        self.state.set_playback_state(PlaybackState::Stopped).await;
        Ok(())
    }

    /// Jump to the next sentence, keeping the pause state
    pub async fn skip_next(self: &Arc<Self>) -> Result<Uuid> {
        let playlist = self.playlist().await;
        let current = self.current_index(&playlist).await;
        let next = playlist
            .next_index(current)
            .ok_or_else(|| Error::InvalidState("already at the last sentence".to_string()))?;
        self.skip_to(next).await
    }

    /// Jump to the previous sentence, keeping the pause state
    pub async fn skip_previous(self: &Arc<Self>) -> Result<Uuid> {
        let playlist = self.playlist().await;
        let current = self.current_index(&playlist).await;
        let previous = playlist
            .previous_index(current)
            .ok_or_else(|| Error::InvalidState("already at the first sentence".to_string()))?;
        self.skip_to(previous).await
    }

    /// Re-play a sentence that failed
    pub async fn retry(self: &Arc<Self>, sentence_id: &str) -> Result<Uuid> {
        if self.sentences.get(sentence_id).await != SentenceState::Error {
            return Err(Error::InvalidState(format!(
                "sentence '{}' has not failed",
                sentence_id
            )));
        }
        self.play(Some(sentence_id)).await
    }

    /// Set and persist the playback rate; returns the clamped value
    pub async fn set_playback_rate(&self, rate: f64) -> Result<f64> {
        if !rate.is_finite() {
            return Err(Error::BadRequest(format!("invalid playback rate {}", rate)));
        }
        let clamped = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        if clamped != rate {
            debug!("Playback rate {} clamped to {}", rate, clamped);
        }

        self.lock_renderer().set_playback_rate(clamped);
        self.settings.write().await.playback_rate = clamped;
        settings::set_playback_rate(&self.db, clamped).await?;
        info!("Playback rate set to {}", clamped);
        Ok(clamped)
    }

    /// Change voice; produced audio is invalidated and the current sentence
    /// restarts with the new voice
    pub async fn set_voice(self: &Arc<Self>, voice: &str) -> Result<()> {
        let voice = voice.trim();
        if voice.is_empty() {
            return Err(Error::BadRequest("voice must not be empty".to_string()));
        }
        {
            let mut current = self.settings.write().await;
            if current.voice == voice {
                return Ok(());
            }
            current.voice = voice.to_string();
        }
        settings::set_voice(&self.db, voice).await?;
        info!("Voice set to '{}'", voice);
        self.apply_synthesis_change().await
    }

    /// Change speech rate; same invalidation as `set_voice`
    pub async fn set_speech_rate(self: &Arc<Self>, rate: f32) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::BadRequest(format!("invalid speech rate {}", rate)));
        }
        {
            let mut current = self.settings.write().await;
            if current.speech_rate == rate {
                return Ok(());
            }
            current.speech_rate = rate;
        }
        settings::set_speech_rate(&self.db, rate).await?;
        info!("Speech rate set to {}", rate);
        self.apply_synthesis_change().await
    }

    /// Remove a book's cached audio; true if anything was removed
    pub async fn delete_book_audio(&self, book_id: &str) -> bool {
        let removed = self.cache.delete_book_audio(book_id).await;
        if self.playlist().await.book_id == book_id {
            self.sentences
                .reset_where(|s| {
                    matches!(
                        s,
                        SentenceState::Playing | SentenceState::Preloading | SentenceState::Error
                    )
                })
                .await;
        }

        info!("Deleted cached audio for book {} (removed: {})", book_id, removed);
        self.state.broadcast_event(LecternEvent::BookAudioDeleted {
            book_id: book_id.to_string(),
            removed,
            timestamp: chrono::Utc::now(),
        });
        removed
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.get_cache_stats().await
    }

    pub async fn status(&self) -> StatusReport {
        let playlist = self.playlist().await;
        let settings = self.settings().await;
        let session = {
            let slot = self.session.lock().await;
            slot.current().map(|s| SessionStatus {
                session_id: s.token.id,
                sentence_id: s.sentence_id.clone(),
                sentence_index: s.sentence_index,
                chapter_index: s.chapter_index,
                phase: s.phase,
                is_paused: s.is_paused,
            })
        };

        StatusReport {
            playback_state: self.state.get_playback_state().await,
            book_id: playlist.book_id.clone(),
            sentence_count: playlist.len(),
            session,
            position: self.state.live_position.current(),
            voice: settings.voice,
            speech_rate: settings.speech_rate,
            playback_rate: settings.playback_rate,
            preload: self.scheduler.status().await,
            cache_enabled: self.cache.is_enabled(),
            synthesizer: self.synthesizer.name().to_string(),
        }
    }

    /// Every sentence of the playlist with its state, in reading order
    pub async fn sentence_statuses(&self) -> Vec<SentenceStatus> {
        let playlist = self.playlist().await;
        let states = self.sentences.snapshot(playlist.ids()).await;

        playlist
            .sentences
            .iter()
            .zip(states)
            .enumerate()
            .map(|(index, (sentence, (_, state)))| SentenceStatus {
                index,
                id: sentence.id.clone(),
                chapter_index: sentence.chapter_index,
                state,
            })
            .collect()
    }

    /// Start `index` as a position jump: preloads are cancelled unless the
    /// sentence already has a live session. A failed sentence is retried.
    async fn jump_to(self: &Arc<Self>, index: usize) -> Result<Uuid> {
        let playlist = self.playlist().await;
        let sentence_id = playlist
            .get(index)
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::NotFound(format!("sentence index {}", index)))?;

        if self.sentences.get(&sentence_id).await == SentenceState::Error {
            info!("Retrying failed sentence {}", sentence_id);
            self.sentences
                .transition(&sentence_id, SentenceState::Pending)
                .await;
        }

        let (is_current, previous) = {
            let slot = self.session.lock().await;
            match slot.current() {
                Some(s) => (
                    s.sentence_index == index && !s.phase.is_finished(),
                    (s.sentence_id != sentence_id).then(|| s.sentence_id.clone()),
                ),
                None => (false, None),
            }
        };

        if !is_current {
            self.scheduler.cancel_all().await;
        }
        if self.state.get_playback_state().await == PlaybackState::Stopped {
            self.state.set_playback_state(PlaybackState::Playing).await;
        }

        let outcome = self.start_sentence(index).await?;

        if let Some(previous) = previous {
            self.sentences
                .transition_if(&previous, &[SentenceState::Playing], SentenceState::Ready)
                .await;
        }
        Ok(outcome.token().id)
    }

    async fn skip_to(self: &Arc<Self>, index: usize) -> Result<Uuid> {
        info!("Skipping to sentence {}", index);
        self.jump_to(index).await
    }

    /// Restart the current sentence after voice settings changed
    async fn apply_synthesis_change(self: &Arc<Self>) -> Result<()> {
        let params = self.params().await;
        self.scheduler.set_params(params).await;
        // The live sentence is restarted below rather than reset
        let reset = self
            .sentences
            .reset_where(|s| s == SentenceState::Playing)
            .await;
        debug!("{} sentences invalidated by synthesis change", reset);

        let restart = {
            let mut slot = self.session.lock().await;
            match slot.current() {
                Some(s) if !s.phase.is_finished() => {
                    let index = s.sentence_index;
                    slot.abort();
                    Some(index)
                }
                _ => None,
            }
        };

        if let Some(index) = restart {
            self.start_sentence(index).await?;
        }
        Ok(())
    }

    /// Leave the paused state if paused
    async fn resume_renderer(&self) {
        if self.state.get_playback_state().await != PlaybackState::Paused {
            return;
        }
        {
            let mut slot = self.session.lock().await;
            slot.set_paused(false);
            self.lock_renderer().resume();
        }
        self.state.set_playback_state(PlaybackState::Playing).await;
    }

    async fn live_session_id(&self) -> Option<Uuid> {
        let slot = self.session.lock().await;
        slot.current()
            .filter(|s| !s.phase.is_finished())
            .map(|s| s.token.id)
    }

    /// Index of the current (or last failed) session, else the saved position
    async fn current_index(&self, playlist: &Playlist) -> usize {
        let current = self.session.lock().await.current().map(|s| s.sentence_index);
        match current {
            Some(index) => index,
            None => self.resume_index(playlist).await,
        }
    }

    /// Saved reading position for the loaded book, else the first sentence
    async fn resume_index(&self, playlist: &Playlist) -> usize {
        match settings::load_reading_position(&self.db, &playlist.book_id).await {
            Ok(Some(position)) => playlist.index_of(&position.sentence_id).unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to load reading position: {}", e);
                0
            }
        }
    }
}
