//! Coordinator construction and renderer event handling
//!
//! The coordinator owns the orchestration side of playback: the current
//! session, the renderer handle, the preload scheduler and sentence states.
//! Renderer events arrive on one task that also keeps the command backlog
//! flowing into the ring.

use crate::cache::CacheClient;
use crate::config::{PreloadConfig, RuntimeSettings};
use crate::playback::playlist::{Playlist, SynthesisParams};
use crate::playback::preload::PreloadScheduler;
use crate::playback::renderer::{renderer_channel, Renderer, RendererEvent, RendererHandle};
use crate::playback::sentence_state::SentenceStateTracker;
use crate::playback::session::SessionSlot;
use crate::playback::streaming_buffer::StreamingPlaybackBuffer;
use crate::state::{PositionSnapshot, SharedState};
use crate::synthesis::SpeechSynthesizer;
use lectern_common::{LecternEvent, PlaybackState, SentenceState};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How often queued renderer commands are retried when the ring was full
const BACKLOG_FLUSH_INTERVAL: Duration = Duration::from_millis(20);

/// Everything the coordinator is built from
pub struct CoordinatorParts {
    pub state: Arc<SharedState>,
    pub db: SqlitePool,
    pub cache: CacheClient,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub settings: RuntimeSettings,
    pub preload: PreloadConfig,
    /// Engine (device) sample rate
    pub sample_rate: u32,
    /// Samples per appended chunk
    pub chunk_samples: usize,
}

pub struct SessionCoordinator {
    pub(super) state: Arc<SharedState>,
    pub(super) db: SqlitePool,
    pub(super) cache: CacheClient,
    pub(super) synthesizer: Arc<dyn SpeechSynthesizer>,
    pub(super) sentences: Arc<SentenceStateTracker>,
    pub(super) scheduler: Arc<PreloadScheduler>,
    /// Lock order: `session` before `renderer`. The renderer lock is never
    /// held across an await.
    pub(super) session: AsyncMutex<SessionSlot>,
    pub(super) renderer: Mutex<RendererHandle>,
    pub(super) playlist: RwLock<Arc<Playlist>>,
    pub(super) settings: RwLock<RuntimeSettings>,
    pub(super) sample_rate: u32,
    pub(super) chunk_samples: usize,
    shutdown: CancellationToken,
}

impl SessionCoordinator {
    /// Build the coordinator, start its background tasks and return the
    /// renderer for the audio output.
    pub fn start(parts: CoordinatorParts) -> (Arc<Self>, Renderer) {
        let CoordinatorParts {
            state,
            db,
            cache,
            synthesizer,
            settings,
            preload,
            sample_rate,
            chunk_samples,
        } = parts;

        let sentences = Arc::new(SentenceStateTracker::new(state.event_bus.clone()));
        let scheduler = PreloadScheduler::new(
            cache.clone(),
            Arc::clone(&synthesizer),
            Arc::clone(&sentences),
            SynthesisParams {
                voice: settings.voice.clone(),
                speech_rate: settings.speech_rate,
            },
            preload,
        );
        scheduler.spawn_workers();

        let (mut handle, renderer, events) =
            renderer_channel(sample_rate, StreamingPlaybackBuffer::for_sample_rate(sample_rate));
        handle.set_playback_rate(settings.playback_rate);

        info!(
            "Session coordinator started: {} Hz, voice '{}', speech rate {}, playback rate {}, synthesizer {}",
            sample_rate,
            settings.voice,
            settings.speech_rate,
            settings.playback_rate,
            synthesizer.name()
        );

        let coordinator = Arc::new(Self {
            state,
            db,
            cache,
            synthesizer,
            sentences,
            scheduler,
            session: AsyncMutex::new(SessionSlot::new()),
            renderer: Mutex::new(handle),
            playlist: RwLock::new(Arc::new(Playlist::default())),
            settings: RwLock::new(settings),
            sample_rate,
            chunk_samples: chunk_samples.max(1),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Arc::clone(&coordinator).event_loop(events));

        (coordinator, renderer)
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn sentence_states(&self) -> &Arc<SentenceStateTracker> {
        &self.sentences
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub async fn playlist(&self) -> Arc<Playlist> {
        Arc::clone(&*self.playlist.read().await)
    }

    pub async fn settings(&self) -> RuntimeSettings {
        self.settings.read().await.clone()
    }

    pub(super) async fn params(&self) -> SynthesisParams {
        let settings = self.settings.read().await;
        SynthesisParams {
            voice: settings.voice.clone(),
            speech_rate: settings.speech_rate,
        }
    }

    /// Renderer handle, recovering from a poisoned lock
    pub(super) fn lock_renderer(&self) -> MutexGuard<'_, RendererHandle> {
        self.renderer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop background tasks and abandon the current session
    pub async fn shutdown(&self) {
        info!("Shutting down session coordinator");
        self.shutdown.cancel();
        self.session.lock().await.end();
        self.scheduler.shutdown().await;
    }

    async fn event_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<RendererEvent>) {
        let mut flush_tick = interval(BACKLOG_FLUSH_INTERVAL);
        debug!("Renderer event loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_renderer_event(event).await,
                    None => {
                        warn!("Renderer event channel closed");
                        break;
                    }
                },
                _ = flush_tick.tick() => {
                    let remaining = self.lock_renderer().flush();
                    if remaining > 0 {
                        trace!("{} renderer commands still backlogged", remaining);
                    }
                }
            }
        }

        debug!("Renderer event loop stopped");
    }

    pub(super) async fn handle_renderer_event(self: &Arc<Self>, event: RendererEvent) {
        match event {
            RendererEvent::Started { unit } => {
                let mut slot = self.session.lock().await;
                let started = slot
                    .mark_playing(unit)
                    .map(|s| (s.sentence_id.clone(), s.sentence_index, s.chapter_index));
                drop(slot);
                let Some((sentence_id, sentence_index, chapter_index)) = started else {
                    trace!("Ignoring start of stale unit {}", unit);
                    return;
                };

                self.sentences
                    .transition(&sentence_id, SentenceState::Playing)
                    .await;
                info!("Sentence {} ({}) audible", sentence_index, sentence_id);
                self.state.broadcast_event(LecternEvent::SentenceStarted {
                    sentence_id,
                    sentence_index,
                    chapter_index,
                    timestamp: chrono::Utc::now(),
                });
            }
            RendererEvent::Progress {
                unit,
                progress,
                read_pos,
                write_pos,
                samples_consumed,
            } => {
                let slot = self.session.lock().await;
                let current = slot
                    .current()
                    .filter(|s| s.unit == Some(unit))
                    .map(|s| (s.sentence_id.clone(), s.sentence_index));
                drop(slot);
                if let Some((sentence_id, sentence_index)) = current {
                    self.state.live_position.publish(PositionSnapshot {
                        sentence_id: Some(sentence_id),
                        sentence_index: Some(sentence_index),
                        progress,
                        read_pos,
                        write_pos,
                        samples_consumed,
                    });
                }
            }
            RendererEvent::Ended {
                unit,
                samples_consumed,
            } => {
                let ended = self.session.lock().await.mark_ended(unit);
                let Some(session) = ended else {
                    trace!("Ignoring end of stale unit {}", unit);
                    return;
                };

                self.sentences
                    .transition(&session.sentence_id, SentenceState::Played)
                    .await;
                debug!(
                    "Sentence {} finished after {} samples",
                    session.sentence_id, samples_consumed
                );
                self.state.broadcast_event(LecternEvent::SentenceCompleted {
                    sentence_id: session.sentence_id.clone(),
                    samples_consumed,
                    timestamp: chrono::Utc::now(),
                });

                self.advance_from(session.sentence_index).await;
            }
        }
    }

    /// Auto-advance after a sentence ends
    async fn advance_from(self: &Arc<Self>, index: usize) {
        let playlist = self.playlist().await;
        match playlist.next_index(index) {
            Some(next) => {
                if let Err(e) = self.start_sentence(next).await {
                    warn!("Auto-advance to sentence {} failed: {}", next, e);
                }
            }
            None => {
                info!("Reached end of book {}", playlist.book_id);
                self.session.lock().await.end();
                self.scheduler.stop().await;
                self.state.live_position.clear();
                self.state.set_playback_state(PlaybackState::Stopped).await;
                self.state.broadcast_event(LecternEvent::PlaybackFinished {
                    book_id: playlist.book_id.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }
}
