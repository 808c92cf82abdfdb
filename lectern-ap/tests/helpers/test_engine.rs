//! Engine under test: coordinator, in-memory database and a render pump
//!
//! The pump stands in for the audio device: a thread that renders small
//! blocks faster than real time until the engine is dropped.

use super::mock_synth::MockSynthesizer;
use lectern_ap::cache::{CacheClient, MemoryCacheStore};
use lectern_ap::config::{PreloadConfig, RuntimeSettings};
use lectern_ap::db;
use lectern_ap::playback::{CoordinatorParts, Playlist, Renderer, Sentence, SessionCoordinator};
use lectern_ap::state::SharedState;
use lectern_common::{KeyScope, SentenceState};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Engine rate used by the tests; small so sentences stay short
pub const TEST_RATE: u32 = 8000;

/// Samples rendered per pump step
const PUMP_BLOCK: usize = 256;

pub struct RenderPump {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RenderPump {
    pub fn start(mut renderer: Renderer) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::spawn(move || {
            let mut block = vec![0.0f32; PUMP_BLOCK];
            while !flag.load(Ordering::Relaxed) {
                renderer.render(&mut block);
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for RenderPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub struct TestEngine {
    pub coordinator: Arc<SessionCoordinator>,
    pub state: Arc<SharedState>,
    pub synth: Arc<MockSynthesizer>,
    pub pool: SqlitePool,
    _pump: RenderPump,
}

impl TestEngine {
    /// Engine with an in-memory cache and default preloading
    pub async fn start(synth: MockSynthesizer) -> Self {
        let cache = CacheClient::new(
            Arc::new(MemoryCacheStore::new(1000)),
            Duration::from_secs(5),
            KeyScope::Sentence,
        );
        Self::start_with(synth, cache).await
    }

    pub async fn start_with(synth: MockSynthesizer, cache: CacheClient) -> Self {
        let pool = db::connect_in_memory().await.expect("in-memory database");
        let synth = Arc::new(synth);
        let state = Arc::new(SharedState::new());

        let (coordinator, renderer) = SessionCoordinator::start(CoordinatorParts {
            state: Arc::clone(&state),
            db: pool.clone(),
            cache,
            synthesizer: synth.clone(),
            settings: RuntimeSettings {
                voice: "alto".to_string(),
                speech_rate: 1.0,
                playback_rate: 1.0,
            },
            preload: PreloadConfig {
                window: 2,
                max_queue_depth: 4,
                workers: 1,
            },
            sample_rate: TEST_RATE,
            chunk_samples: 1024,
        });

        Self {
            coordinator,
            state,
            synth,
            pool,
            _pump: RenderPump::start(renderer),
        }
    }

    pub async fn state_of(&self, sentence_id: &str) -> SentenceState {
        self.coordinator.sentence_states().get(sentence_id).await
    }

    /// Wait until `sentence_id` reaches `state`; false on timeout
    pub async fn wait_for_state(&self, sentence_id: &str, state: SentenceState) -> bool {
        wait_until(Duration::from_secs(10), || async move {
            self.state_of(sentence_id).await == state
        })
        .await
    }
}

/// Book `book` with `n` sentences `s0..s{n-1}`, two per chapter
pub fn playlist(book: &str, n: usize) -> Playlist {
    Playlist::new(
        book,
        (0..n)
            .map(|i| Sentence {
                id: format!("s{}", i),
                chapter_id: format!("c{}", i / 2),
                chapter_index: i / 2,
                text: text_of(i),
            })
            .collect(),
    )
}

pub fn text_of(index: usize) -> String {
    format!("This is sentence number {}.", index)
}

/// Poll `check` every 5 ms until it holds or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
