//! Look-ahead synthesis of upcoming sentences
//!
//! Keeps a window of sentences after the playhead synthesized and cached so
//! playback rarely waits on the provider. Work is scheduled nearest first
//! and bounded by a worker count.
//!
//! All queued and in-flight work belongs to a generation, represented by a
//! cancellation token. A position jump or a voice change cancels the
//! generation; late results from it are discarded and their sentences go
//! back to `Pending`. A sentence whose preload failed is not retried within
//! the same generation; the foreground path reports the real failure.

use crate::audio::decoder::AudioDecoder;
use crate::cache::CacheClient;
use crate::config::PreloadConfig;
use crate::playback::playlist::{Playlist, Sentence, SynthesisParams};
use crate::playback::preload_queue::{PreloadQueue, PreloadTask, PreloadTaskState};
use crate::playback::sentence_state::SentenceStateTracker;
use crate::synthesis::{SpeechSynthesizer, SynthesisError};
use lectern_common::SentenceState;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observable scheduler counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PreloadStatus {
    pub active: bool,
    pub playhead: Option<usize>,
    pub queued: usize,
    pub in_flight: usize,
}

enum PreloadOutcome {
    Ready,
    Discarded,
    Failed(String),
}

struct PreloadJob {
    task: PreloadTask,
    token: CancellationToken,
    book_id: String,
    params: SynthesisParams,
}

struct SchedulerInner {
    queue: PreloadQueue,
    in_flight: HashSet<String>,
    failed: HashSet<String>,
    playlist: Arc<Playlist>,
    params: SynthesisParams,
    playhead: Option<usize>,
    active: bool,
    generation: CancellationToken,
}

pub struct PreloadScheduler {
    inner: Mutex<SchedulerInner>,
    notify: Notify,
    cache: CacheClient,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sentences: Arc<SentenceStateTracker>,
    config: PreloadConfig,
    shutdown: CancellationToken,
}

impl PreloadScheduler {
    pub fn new(
        cache: CacheClient,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sentences: Arc<SentenceStateTracker>,
        params: SynthesisParams,
        config: PreloadConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SchedulerInner {
                queue: PreloadQueue::new(),
                in_flight: HashSet::new(),
                failed: HashSet::new(),
                playlist: Arc::new(Playlist::default()),
                params,
                playhead: None,
                active: false,
                generation: CancellationToken::new(),
            }),
            notify: Notify::new(),
            cache,
            synthesizer,
            sentences,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawn `config.workers` worker tasks
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let workers = self.config.workers.max(1);
        info!(
            "Starting {} preload worker(s), window {}, max depth {}",
            workers, self.config.window, self.config.max_queue_depth
        );
        (0..workers)
            .map(|worker_id| {
                let scheduler = Arc::clone(self);
                tokio::spawn(async move { scheduler.worker_loop(worker_id).await })
            })
            .collect()
    }

    /// Replace the playlist; all outstanding work is cancelled
    pub async fn set_playlist(&self, playlist: Arc<Playlist>) {
        let cancelled = {
            let mut inner = self.inner.lock().await;
            inner.playlist = playlist;
            inner.playhead = None;
            inner.active = false;
            Self::cancel_locked(&mut inner)
        };
        self.revert(cancelled).await;
    }

    /// Replace voice settings; work produced with the old ones is cancelled
    pub async fn set_params(&self, params: SynthesisParams) {
        let cancelled = {
            let mut inner = self.inner.lock().await;
            inner.params = params;
            Self::cancel_locked(&mut inner)
        };
        self.revert(cancelled).await;
    }

    /// Move the playhead, drop work at or behind it and refill ahead of it
    pub async fn set_playhead(&self, index: usize) {
        let dropped = {
            let mut inner = self.inner.lock().await;
            inner.playhead = Some(index);
            inner.active = true;
            inner.queue.remove_where(|t| t.sentence_index <= index)
        };
        if !dropped.is_empty() {
            debug!("Dropped {} preload tasks behind playhead {}", dropped.len(), index);
        }
        self.revert(dropped).await;
        self.extend_queue(index).await;
    }

    /// Enqueue `Pending` sentences in `(from_index, from_index + window]`,
    /// up to the queue depth cap. Returns the number enqueued.
    pub async fn extend_queue(&self, from_index: usize) -> usize {
        if !self.cache.is_enabled() {
            return 0;
        }

        let mut inner = self.inner.lock().await;
        if !inner.active {
            return 0;
        }

        let playhead = inner.playhead.unwrap_or(from_index);
        let playlist = Arc::clone(&inner.playlist);
        let end = from_index
            .saturating_add(self.config.window)
            .min(playlist.len().saturating_sub(1));

        let mut pushed = 0;
        for index in (from_index + 1)..=end {
            if inner.queue.len() >= self.config.max_queue_depth {
                break;
            }
            let Some(sentence) = playlist.get(index) else {
                break;
            };
            if inner.in_flight.contains(&sentence.id)
                || inner.failed.contains(&sentence.id)
                || inner.queue.contains(&sentence.id)
            {
                continue;
            }
            if self.sentences.get(&sentence.id).await != SentenceState::Pending {
                continue;
            }
            if !self
                .sentences
                .transition(&sentence.id, SentenceState::Preloading)
                .await
            {
                continue;
            }

            inner
                .queue
                .push(sentence.clone(), index, index.saturating_sub(playhead));
            pushed += 1;
        }
        drop(inner);

        for _ in 0..pushed {
            self.notify.notify_one();
        }
        pushed
    }

    /// Cancel the current generation and empty the queue
    pub async fn cancel_all(&self) {
        let cancelled = {
            let mut inner = self.inner.lock().await;
            Self::cancel_locked(&mut inner)
        };
        if !cancelled.is_empty() {
            debug!("Cancelled {} queued preload tasks", cancelled.len());
        }
        self.revert(cancelled).await;
    }

    /// Stop preloading until the next `set_playhead`
    pub async fn stop(&self) {
        let cancelled = {
            let mut inner = self.inner.lock().await;
            inner.active = false;
            Self::cancel_locked(&mut inner)
        };
        self.revert(cancelled).await;
    }

    /// Remove a queued task the foreground is about to produce itself
    pub async fn withdraw(&self, sentence_id: &str) {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.queue.remove_where(|t| t.sentence.id == sentence_id)
        };
        self.revert(removed).await;
    }

    pub async fn status(&self) -> PreloadStatus {
        let inner = self.inner.lock().await;
        PreloadStatus {
            active: inner.active,
            playhead: inner.playhead,
            queued: inner.queue.len(),
            in_flight: inner.in_flight.len(),
        }
    }

    /// Stop workers and cancel outstanding work
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop().await;
    }

    fn cancel_locked(inner: &mut SchedulerInner) -> Vec<PreloadTask> {
        inner.generation.cancel();
        inner.generation = CancellationToken::new();
        inner.failed.clear();
        inner.queue.clear()
    }

    async fn revert(&self, tasks: Vec<PreloadTask>) {
        for task in tasks {
            self.sentences
                .transition_if(&task.sentence.id, &[SentenceState::Preloading], SentenceState::Pending)
                .await;
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!("Preload worker {} started", worker_id);
        while !self.shutdown.is_cancelled() {
            match self.next_job().await {
                Some(job) => self.run(job).await,
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
        debug!("Preload worker {} stopped", worker_id);
    }

    async fn next_job(&self) -> Option<PreloadJob> {
        let mut inner = self.inner.lock().await;
        let mut task = inner.queue.pop()?;
        task.state = PreloadTaskState::InFlight;
        inner.in_flight.insert(task.sentence.id.clone());
        Some(PreloadJob {
            task,
            token: inner.generation.clone(),
            book_id: inner.playlist.book_id.clone(),
            params: inner.params.clone(),
        })
    }

    async fn run(&self, job: PreloadJob) {
        let PreloadJob {
            mut task,
            token,
            book_id,
            params,
        } = job;
        let sentence_id = task.sentence.id.clone();

        let mut failed = false;
        match self.produce(&task.sentence, &book_id, &params, &token).await {
            PreloadOutcome::Ready if !token.is_cancelled() => {
                task.state = PreloadTaskState::Done;
                self.sentences
                    .transition_if(
                        &sentence_id,
                        &[SentenceState::Preloading, SentenceState::Pending],
                        SentenceState::Ready,
                    )
                    .await;
            }
            PreloadOutcome::Ready | PreloadOutcome::Discarded => {
                task.state = PreloadTaskState::Cancelled;
                debug!("Discarded preload of {}", sentence_id);
                self.sentences
                    .transition_if(&sentence_id, &[SentenceState::Preloading], SentenceState::Pending)
                    .await;
            }
            PreloadOutcome::Failed(message) => {
                task.state = PreloadTaskState::Done;
                warn!("Preload of {} failed: {}", sentence_id, message);
                failed = true;
                self.sentences
                    .transition_if(&sentence_id, &[SentenceState::Preloading], SentenceState::Pending)
                    .await;
            }
        }

        let refill_from = {
            let mut inner = self.inner.lock().await;
            inner.in_flight.remove(&sentence_id);
            if failed && !token.is_cancelled() {
                inner.failed.insert(sentence_id.clone());
            }
            if inner.active && !token.is_cancelled() {
                inner.playhead
            } else {
                None
            }
        };

        if let Some(playhead) = refill_from {
            self.extend_queue(playhead).await;
        }
    }

    /// Cache first, then the provider; stores provider audio once it decodes
    async fn produce(
        &self,
        sentence: &Sentence,
        book_id: &str,
        params: &SynthesisParams,
        token: &CancellationToken,
    ) -> PreloadOutcome {
        if token.is_cancelled() {
            return PreloadOutcome::Discarded;
        }

        let request = params.cache_request(book_id, sentence);
        if self.cache.get_cached_audio(&request).await.audio.is_some() {
            return PreloadOutcome::Ready;
        }
        if token.is_cancelled() {
            return PreloadOutcome::Discarded;
        }

        match self
            .synthesizer
            .synthesize(&params.synthesis_request(sentence), token)
            .await
        {
            Ok(audio) => {
                if token.is_cancelled() {
                    return PreloadOutcome::Discarded;
                }
                let (audio, decoded) = match tokio::task::spawn_blocking(move || {
                    let decoded = AudioDecoder::decode_bytes(&audio).map(|_| ());
                    (audio, decoded)
                })
                .await
                {
                    Ok(result) => result,
                    Err(e) => return PreloadOutcome::Failed(format!("decode task failed: {}", e)),
                };
                if let Err(e) = decoded {
                    return PreloadOutcome::Failed(e.to_string());
                }
                if token.is_cancelled() {
                    return PreloadOutcome::Discarded;
                }
                if !self.cache.cache_audio(&request, &audio).await.success {
                    return PreloadOutcome::Failed("audio could not be cached".to_string());
                }
                PreloadOutcome::Ready
            }
            Err(SynthesisError::Cancelled) => PreloadOutcome::Discarded,
            Err(SynthesisError::Failed(message)) => PreloadOutcome::Failed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::synthesis::SynthesisRequest;
    use async_trait::async_trait;
    use lectern_common::{EventBus, KeyScope};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSynth {
        calls: AtomicUsize,
        hang: bool,
        garbage: bool,
    }

    fn tone_wav() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..800 {
                writer.write_sample(((i % 40) as i16 - 20) * 500).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
            cancel: &CancellationToken,
        ) -> Result<Vec<u8>, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                cancel.cancelled().await;
                return Err(SynthesisError::Cancelled);
            }
            if self.garbage {
                return Ok(request.text.as_bytes().to_vec());
            }
            Ok(tone_wav())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn playlist(n: usize) -> Arc<Playlist> {
        Arc::new(Playlist::new(
            "book",
            (0..n)
                .map(|i| Sentence {
                    id: format!("s{}", i),
                    chapter_id: "c".to_string(),
                    chapter_index: 0,
                    text: format!("Sentence number {}.", i),
                })
                .collect(),
        ))
    }

    async fn setup(hang: bool) -> (Arc<PreloadScheduler>, Arc<SentenceStateTracker>, Arc<CountingSynth>) {
        let (scheduler, tracker, synth, _) = setup_with(hang, false).await;
        (scheduler, tracker, synth)
    }

    async fn setup_with(
        hang: bool,
        garbage: bool,
    ) -> (
        Arc<PreloadScheduler>,
        Arc<SentenceStateTracker>,
        Arc<CountingSynth>,
        Arc<MemoryCacheStore>,
    ) {
        let tracker = Arc::new(SentenceStateTracker::new(EventBus::new(256)));
        let synth = Arc::new(CountingSynth {
            calls: AtomicUsize::new(0),
            hang,
            garbage,
        });
        let store = Arc::new(MemoryCacheStore::new(100));
        let cache = CacheClient::new(store.clone(), Duration::from_secs(5), KeyScope::Sentence);
        let scheduler = PreloadScheduler::new(
            cache,
            synth.clone(),
            tracker.clone(),
            SynthesisParams {
                voice: "alto".to_string(),
                speech_rate: 1.0,
            },
            PreloadConfig {
                window: 3,
                max_queue_depth: 8,
                workers: 2,
            },
        );
        let list = playlist(10);
        tracker.load(list.ids()).await;
        scheduler.set_playlist(list).await;
        scheduler.spawn_workers();
        (scheduler, tracker, synth, store)
    }

    async fn wait_for_state(tracker: &SentenceStateTracker, id: &str, state: SentenceState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while tracker.get(id).await != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{} never reached {}", id, state));
    }

    #[tokio::test]
    async fn test_window_ahead_of_playhead_becomes_ready() {
        let (scheduler, tracker, synth) = setup(false).await;

        scheduler.set_playhead(0).await;

        for id in ["s1", "s2", "s3"] {
            wait_for_state(&tracker, id, SentenceState::Ready).await;
        }
        assert_eq!(tracker.get("s4").await, SentenceState::Pending);
        assert_eq!(tracker.get("s0").await, SentenceState::Pending);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 3);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_all_reverts_preloading() {
        let (scheduler, tracker, _synth) = setup(true).await;

        scheduler.set_playhead(4).await;
        assert_eq!(tracker.get("s5").await, SentenceState::Preloading);

        scheduler.cancel_all().await;

        for id in ["s5", "s6", "s7"] {
            wait_for_state(&tracker, id, SentenceState::Pending).await;
        }
        let status = scheduler.status().await;
        assert_eq!(status.queued, 0);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_playhead_jump_drops_tasks_behind() {
        let (scheduler, tracker, _synth) = setup(true).await;

        scheduler.set_playhead(0).await;
        scheduler.set_playhead(5).await;

        // s1..s3 were queued or in flight for the old playhead; queued ones
        // are dropped immediately, in-flight ones keep running
        let status = scheduler.status().await;
        assert!(status.queued <= 3);
        assert_eq!(status.playhead, Some(5));
        assert_eq!(tracker.get("s6").await, SentenceState::Preloading);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_cache_schedules_nothing() {
        let tracker = Arc::new(SentenceStateTracker::new(EventBus::new(16)));
        let scheduler = PreloadScheduler::new(
            CacheClient::disabled(KeyScope::Sentence),
            Arc::new(CountingSynth {
                calls: AtomicUsize::new(0),
                hang: false,
                garbage: false,
            }),
            tracker.clone(),
            SynthesisParams {
                voice: "alto".to_string(),
                speech_rate: 1.0,
            },
            PreloadConfig::default(),
        );
        scheduler.set_playlist(playlist(5)).await;
        scheduler.set_playhead(0).await;
        assert_eq!(scheduler.status().await.queued, 0);
        assert_eq!(tracker.get("s1").await, SentenceState::Pending);
    }

    #[tokio::test]
    async fn test_undecodable_audio_is_not_cached_or_ready() {
        let (scheduler, tracker, synth, store) = setup_with(false, true).await;

        scheduler.set_playhead(0).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while synth.calls.load(Ordering::SeqCst) < 3 || scheduler.status().await.in_flight > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        for id in ["s1", "s2", "s3"] {
            wait_for_state(&tracker, id, SentenceState::Pending).await;
        }
        assert_eq!(store.stats().await.unwrap().entries, 0);
        scheduler.shutdown().await;
    }
}
