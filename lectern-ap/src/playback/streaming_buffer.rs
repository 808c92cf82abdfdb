//! Growable playback buffer for one sentence of streamed audio
//!
//! Owned exclusively by the renderer on the audio thread. Samples are
//! appended linearly (never overwritten) and read at a fractional position
//! advanced by the playback rate, so one sentence can be sped up or slowed
//! down without re-synthesis.
//!
//! # Invariants
//!
//! - `0 <= read_pos <= write_pos <= capacity`
//! - Audio is never audible before `Started`
//! - `Started` happens exactly once per unit: when buffered audio first
//!   reaches the start threshold, or on completion if the unit is shorter
//! - `Ended` is reported exactly once per unit, after completion, once the
//!   read position reaches the write position
//! - `reset()` returns the buffer to the initial state and releases grown
//!   memory back to the initial capacity; the playback rate is kept
//!
//! # Storage handoff
//!
//! The renderer never allocates or frees sample storage itself.
//! [`reset_with`](StreamingPlaybackBuffer::reset_with) and
//! [`adopt_storage`](StreamingPlaybackBuffer::adopt_storage) take storage
//! built by the orchestrator and return the displaced storage, which travels
//! back to be dropped off the audio thread. Only an append past every
//! preallocation still grows in place.
//!
//! # Interpolation
//!
//! With `i = floor(read_pos)` and `frac = read_pos - i`:
//! - if `i + 1 < write_pos`: `s[i] + frac * (s[i+1] - s[i])`
//! - else if `i < write_pos`: `s[i]`
//! - else silence and the read position does not move
//!
//! After emitting, `read_pos = min(read_pos + rate, write_pos)`. At rate 1.0
//! every sample is reproduced exactly; at rate r, N samples drain in about
//! N / r frames.

use crate::audio::types::{start_threshold_samples, DEFAULT_SAMPLE_RATE};

/// Slowest supported playback rate
pub const MIN_PLAYBACK_RATE: f64 = 0.5;

/// Fastest supported playback rate
pub const MAX_PLAYBACK_RATE: f64 = 2.0;

/// Headroom applied on top of a known unit length
const PREALLOCATE_HEADROOM: f64 = 1.2;

/// Initial capacity in seconds of audio
const INITIAL_CAPACITY_SECONDS: usize = 5;

/// Storage length for a unit of `estimated_samples`, with 20% headroom
pub fn preallocation_len(estimated_samples: usize) -> usize {
    (estimated_samples as f64 * PREALLOCATE_HEADROOM).ceil() as usize
}

/// Whether the unit has become audible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartState {
    Buffering,
    Started,
}

/// Whether more audio will arrive for the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Producer may still append
    Streaming,
    /// Producer is done; unit plays until drained
    Complete,
    /// Drained and reported
    Ended,
}

/// Snapshot of position counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferProgress {
    /// `read_pos / write_pos`, 0.0 when empty
    pub progress: f64,
    pub read_pos: f64,
    pub write_pos: u64,
    pub samples_consumed: u64,
}

/// Linear, growable, fractionally-read sample buffer
#[derive(Debug)]
pub struct StreamingPlaybackBuffer {
    samples: Vec<f32>,
    initial_capacity: usize,
    start_threshold: usize,
    write_pos: usize,
    read_pos: f64,
    playback_rate: f64,
    start: StartState,
    completion: CompletionState,
    paused: bool,
    /// Output frames produced from buffered audio
    samples_consumed: u64,
}

impl StreamingPlaybackBuffer {
    /// Create a buffer with explicit capacity floor and start threshold
    pub fn new(initial_capacity: usize, start_threshold: usize) -> Self {
        let initial_capacity = initial_capacity.max(1);
        Self {
            samples: vec![0.0; initial_capacity],
            initial_capacity,
            start_threshold,
            write_pos: 0,
            read_pos: 0.0,
            playback_rate: 1.0,
            start: StartState::Buffering,
            completion: CompletionState::Streaming,
            paused: false,
            samples_consumed: 0,
        }
    }

    /// Buffer sized for `sample_rate`: five seconds of floor, half a second to start
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self::new(
            sample_rate as usize * INITIAL_CAPACITY_SECONDS,
            start_threshold_samples(sample_rate),
        )
    }

    /// Append samples, growing by doubling as needed.
    ///
    /// Returns true if this append made the unit start.
    pub fn append(&mut self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }

        let required = self.write_pos + chunk.len();
        self.ensure_capacity(required);
        self.samples[self.write_pos..required].copy_from_slice(chunk);
        self.write_pos = required;

        if self.start == StartState::Buffering && self.buffered() >= self.start_threshold as f64 {
            self.start = StartState::Started;
            return true;
        }
        false
    }

    /// Producer signals no more chunks will arrive.
    ///
    /// A unit shorter than the start threshold starts here. Returns true if
    /// this call made the unit start.
    pub fn mark_complete(&mut self) -> bool {
        if self.completion == CompletionState::Streaming {
            self.completion = CompletionState::Complete;
        }

        if self.start == StartState::Buffering && self.write_pos > 0 {
            self.start = StartState::Started;
            return true;
        }
        false
    }

    /// Produce the next output sample
    pub fn render_sample(&mut self) -> f32 {
        if self.start != StartState::Started || self.paused {
            return 0.0;
        }

        let index = self.read_pos as usize;
        if index >= self.write_pos {
            return 0.0;
        }

        let sample = if index + 1 < self.write_pos {
            let frac = (self.read_pos - index as f64) as f32;
            let current = self.samples[index];
            current + frac * (self.samples[index + 1] - current)
        } else {
            self.samples[index]
        };

        self.read_pos = (self.read_pos + self.playback_rate).min(self.write_pos as f64);
        self.samples_consumed += 1;
        sample
    }

    /// Report the drained unit.
    ///
    /// Returns true exactly once per unit: the first call after completion
    /// where the read position has caught up with the write position.
    pub fn take_ended(&mut self) -> bool {
        if self.completion == CompletionState::Complete && self.read_pos >= self.write_pos as f64 {
            self.completion = CompletionState::Ended;
            return true;
        }
        false
    }

    /// Clamp to [0.5, 2.0]; non-finite values are ignored.
    ///
    /// Returns the rate in effect after the call.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        if rate.is_finite() {
            self.playback_rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        }
        self.playback_rate
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Return to the initial state for a new unit, keeping the playback rate.
    ///
    /// Allocates when the buffer had grown; the renderer uses
    /// [`reset_with`](Self::reset_with) instead.
    pub fn reset(&mut self) {
        if self.samples.len() != self.initial_capacity {
            self.samples = vec![0.0; self.initial_capacity];
        }
        self.clear_unit();
    }

    /// Reset onto `storage` and return the storage it replaces.
    ///
    /// The contents of `storage` are never read before being written.
    pub fn reset_with(&mut self, storage: Vec<f32>) -> Vec<f32> {
        let old = std::mem::replace(&mut self.samples, storage);
        self.clear_unit();
        old
    }

    /// Move buffered audio into larger `storage` and return the old storage.
    ///
    /// Storage no larger than the current one is handed straight back. Never
    /// shrinks.
    pub fn adopt_storage(&mut self, mut storage: Vec<f32>) -> Vec<f32> {
        if storage.len() <= self.samples.len() {
            return storage;
        }
        storage[..self.write_pos].copy_from_slice(&self.samples[..self.write_pos]);
        std::mem::swap(&mut self.samples, &mut storage);
        storage
    }

    /// Grow to hold `estimated_samples` plus 20% headroom. Never shrinks.
    ///
    /// Allocates in place; the renderer receives prebuilt storage through
    /// [`adopt_storage`](Self::adopt_storage) instead.
    pub fn preallocate(&mut self, estimated_samples: usize) {
        let target = preallocation_len(estimated_samples);
        if target > self.samples.len() {
            let _old = self.adopt_storage(vec![0.0; target]);
        }
    }

    fn clear_unit(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0.0;
        self.start = StartState::Buffering;
        self.completion = CompletionState::Streaming;
        self.paused = false;
        self.samples_consumed = 0;
    }

    fn ensure_capacity(&mut self, required: usize) {
        let mut capacity = self.samples.len().max(1);
        if required <= capacity {
            return;
        }
        while capacity < required {
            capacity *= 2;
        }
        self.samples.resize(capacity, 0.0);
    }

    /// Samples appended but not yet read
    pub fn buffered(&self) -> f64 {
        self.write_pos as f64 - self.read_pos
    }

    pub fn progress(&self) -> BufferProgress {
        let progress = if self.write_pos == 0 {
            0.0
        } else {
            self.read_pos / self.write_pos as f64
        };
        BufferProgress {
            progress,
            read_pos: self.read_pos,
            write_pos: self.write_pos as u64,
            samples_consumed: self.samples_consumed,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    pub fn start_threshold(&self) -> usize {
        self.start_threshold
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn read_pos(&self) -> f64 {
        self.read_pos
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn start_state(&self) -> StartState {
        self.start
    }

    pub fn completion_state(&self) -> CompletionState {
        self.completion
    }

    pub fn is_started(&self) -> bool {
        self.start == StartState::Started
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_ended(&self) -> bool {
        self.completion == CompletionState::Ended
    }

    pub fn samples_consumed(&self) -> u64 {
        self.samples_consumed
    }
}

impl Default for StreamingPlaybackBuffer {
    fn default() -> Self {
        Self::for_sample_rate(DEFAULT_SAMPLE_RATE)
    }
}
