//! Scripted speech provider
//!
//! Returns a sine WAV for every request. Individual texts can be made to
//! fail, to hang until cancelled or to answer once with bytes that are not
//! audio; every request is recorded.

use super::audio_generator::sine_wav;
use async_trait::async_trait;
use lectern_ap::synthesis::{SpeechSynthesizer, SynthesisError, SynthesisRequest};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct MockSynthesizer {
    sample_rate: u32,
    duration_ms: u64,
    delay: Duration,
    requests: Mutex<Vec<SynthesisRequest>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    malformed_once: Mutex<HashSet<String>>,
    cancelled: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new(sample_rate: u32, duration_ms: u64) -> Self {
        Self {
            sample_rate,
            duration_ms,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            malformed_once: Mutex::new(HashSet::new()),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_text(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Requests for `text` wait until their token is cancelled
    pub fn hang_text(&self, text: &str) {
        self.hanging.lock().unwrap().insert(text.to_string());
    }

    /// The next request for `text` succeeds with bytes no decoder accepts
    pub fn malform_next(&self, text: &str) {
        self.malformed_once.lock().unwrap().insert(text.to_string());
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.text == text)
            .count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.requests.lock().unwrap().push(request.clone());

        let hangs = self.hanging.lock().unwrap().contains(&request.text);
        if hangs {
            cancel.cancelled().await;
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            return Err(SynthesisError::Cancelled);
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(SynthesisError::Cancelled);
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let fails = self.failing.lock().unwrap().contains(&request.text);
        if fails {
            return Err(SynthesisError::Failed(format!(
                "scripted failure for '{}'",
                request.text
            )));
        }

        let malformed = self.malformed_once.lock().unwrap().remove(&request.text);
        if malformed {
            return Ok(b"not audio at all".to_vec());
        }

        Ok(sine_wav(self.sample_rate, self.duration_ms, 440.0))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
