//! Starting a sentence and feeding its audio to the renderer
//!
//! Audio comes from the cache when possible, otherwise from the provider
//! (and is then stored once it decodes). Decoding and resampling run on the blocking pool.
//! The session token is checked before synthesis, before every result is
//! applied and for every appended chunk; a cancelled feed is dropped
//! silently.

use super::core::SessionCoordinator;
use crate::audio::decoder::AudioDecoder;
use crate::audio::types::into_chunks;
use crate::db::settings;
use crate::error::{Error, Result};
use crate::playback::playlist::Sentence;
use crate::playback::session::{SessionToken, StartOutcome};
use crate::state::PositionSnapshot;
use crate::synthesis::SynthesisError;
use lectern_common::{LecternEvent, PlaybackState, SentenceState};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

impl SessionCoordinator {
    /// Start (or keep) the session for the sentence at `index`.
    ///
    /// A new session cancels the old token before the renderer is reset, so
    /// the old feed can no longer append once the new unit begins.
    pub(super) async fn start_sentence(self: &Arc<Self>, index: usize) -> Result<StartOutcome> {
        let playlist = self.playlist().await;
        let sentence = playlist
            .get(index)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("sentence index {}", index)))?;
        let paused = self.state.get_playback_state().await == PlaybackState::Paused;

        let outcome = {
            let mut slot = self.session.lock().await;
            let outcome = slot.start(&sentence.id, index, sentence.chapter_index);
            if let StartOutcome::Started { token, superseded } = &outcome {
                let unit = {
                    let mut renderer = self.lock_renderer();
                    let unit = renderer.reset();
                    if paused {
                        renderer.pause();
                    }
                    unit
                };
                slot.set_unit(token, unit);
                if paused {
                    slot.set_paused(true);
                }
                if let Some(old) = superseded {
                    debug!("Session {} superseded by {}", old, token.id);
                }
            }
            outcome
        };

        let StartOutcome::Started { token, .. } = &outcome else {
            trace!("Sentence {} already has a live session", sentence.id);
            return Ok(outcome);
        };

        info!(
            "Starting sentence {} ({}) of book {}",
            index, sentence.id, playlist.book_id
        );

        self.state.live_position.publish(PositionSnapshot {
            sentence_id: Some(sentence.id.clone()),
            sentence_index: Some(index),
            ..PositionSnapshot::default()
        });

        self.scheduler.withdraw(&sentence.id).await;
        self.scheduler.set_playhead(index).await;

        if let Err(e) =
            settings::save_reading_position(&self.db, &playlist.book_id, &sentence.id, index).await
        {
            warn!("Failed to persist reading position: {}", e);
        }

        let coordinator = Arc::clone(self);
        let token = token.clone();
        let book_id = playlist.book_id.clone();
        tokio::spawn(async move {
            coordinator.feed(token, book_id, sentence).await;
        });

        Ok(outcome)
    }

    async fn feed(self: Arc<Self>, token: SessionToken, book_id: String, sentence: Sentence) {
        match self.produce_samples(&token, &book_id, &sentence).await {
            Ok(Some(samples)) => {
                if !self.append_samples(&token, samples) {
                    debug!("Feed for {} cancelled while appending", sentence.id);
                }
            }
            Ok(None) => debug!("Feed for {} discarded", sentence.id),
            Err(e) => self.fail_sentence(&token, &sentence, e).await,
        }
    }

    /// Decoded engine-rate samples, or `None` once the session is gone
    ///
    /// Provider audio is stored only after it decodes. A cached entry that
    /// no longer decodes is evicted and the sentence is synthesized again.
    async fn produce_samples(
        &self,
        token: &SessionToken,
        book_id: &str,
        sentence: &Sentence,
    ) -> Result<Option<Vec<f32>>> {
        let params = self.params().await;
        let request = params.cache_request(book_id, sentence);

        if let Some(bytes) = self.cache.get_cached_audio(&request).await.audio {
            if token.is_cancelled() {
                return Ok(None);
            }
            match self.decode(bytes).await? {
                (_, Ok(samples)) => return Ok((!token.is_cancelled()).then_some(samples)),
                (_, Err(e)) => {
                    warn!("Cached audio for sentence {} is unusable: {}", sentence.id, e);
                    self.cache.evict_cached_audio(&request).await;
                }
            }
        }

        if token.is_cancelled() {
            return Ok(None);
        }
        debug!("Synthesizing sentence {} on demand", sentence.id);
        let audio = match self
            .synthesizer
            .synthesize(&params.synthesis_request(sentence), token.cancellation())
            .await
        {
            Ok(audio) => audio,
            Err(SynthesisError::Cancelled) => return Ok(None),
            Err(SynthesisError::Failed(message)) => return Err(Error::Synthesis(message)),
        };
        if token.is_cancelled() {
            return Ok(None);
        }

        let (audio, decoded) = self.decode(audio).await?;
        let samples = decoded?;
        if token.is_cancelled() {
            return Ok(None);
        }
        self.cache.cache_audio(&request, &audio).await;
        Ok(Some(samples))
    }

    /// Decode on the blocking pool, handing the bytes back with the result
    async fn decode(&self, bytes: Vec<u8>) -> Result<(Vec<u8>, Result<Vec<f32>>)> {
        let sample_rate = self.sample_rate;
        tokio::task::spawn_blocking(move || {
            let decoded = AudioDecoder::decode_for_playback(&bytes, sample_rate);
            (bytes, decoded)
        })
        .await
        .map_err(|e| Error::Internal(format!("decode task failed: {}", e)))
    }

    /// Append a whole sentence under the renderer lock; false if the session
    /// was cancelled first.
    pub(super) fn append_samples(&self, token: &SessionToken, samples: Vec<f32>) -> bool {
        let total = samples.len();
        let chunks = into_chunks(samples, self.chunk_samples);

        let mut renderer = self.lock_renderer();
        if token.is_cancelled() {
            return false;
        }

        renderer.preallocate(total);
        for chunk in chunks {
            if token.is_cancelled() {
                return false;
            }
            renderer.append(chunk);
        }
        renderer.complete();
        trace!("Appended {} samples to unit {}", total, renderer.current_unit());
        true
    }

    /// Provider failure: the sentence errors and auto-advance halts
    async fn fail_sentence(&self, token: &SessionToken, sentence: &Sentence, e: Error) {
        if !self.session.lock().await.abort_if_current(token) {
            debug!("Ignoring failure of stale session for {}: {}", sentence.id, e);
            return;
        }

        error!("Sentence {} failed: {}", sentence.id, e);
        self.sentences
            .transition(&sentence.id, SentenceState::Error)
            .await;
        self.state.set_playback_state(PlaybackState::Stopped).await;
        self.state.broadcast_event(LecternEvent::SentenceFailed {
            sentence_id: sentence.id.clone(),
            error: e.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}
