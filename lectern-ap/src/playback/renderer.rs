//! Real-time renderer and its orchestration-side handle
//!
//! The renderer runs inside the device callback. It owns the
//! [`StreamingPlaybackBuffer`] outright; the orchestrator reaches it only
//! through a lock-free SPSC command ring. The renderer reports back through
//! an unbounded channel whose send never blocks.
//!
//! Each render quantum (128 frames) first drains the commands that were
//! queued when the quantum began, then renders. Commands therefore apply in
//! FIFO order and take effect at a quantum boundary.
//!
//! Every `Reset` opens a new playback unit, numbered by the handle. Events
//! carry the unit they belong to so the orchestrator can drop stale ones.
//!
//! Sample storage is allocated by the handle and sent along with `Reset` and
//! `Preallocate`. Storage the renderer lets go of (the previous unit's
//! buffer, spent chunks) goes back through a second SPSC ring and is freed
//! by the handle on its next flush.

use crate::audio::types::{AudioChunk, RENDER_QUANTUM_FRAMES};
use crate::playback::streaming_buffer::{
    preallocation_len, CompletionState, StreamingPlaybackBuffer,
};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Command ring capacity
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Retired storage ring capacity
///
/// Each command retires at most one allocation and the handle reclaims
/// before every push, so this ring cannot fill.
const RETIRED_QUEUE_CAPACITY: usize = COMMAND_QUEUE_CAPACITY;

/// Progress events per second of rendered audio
pub const PROGRESS_EVENTS_PER_SECOND: u32 = 30;

/// Orchestrator to renderer messages
#[derive(Debug)]
pub enum RendererCommand {
    Append(AudioChunk),
    Complete,
    /// Open `unit` on fresh storage
    Reset { unit: u64, storage: Vec<f32> },
    Pause,
    Resume,
    SetPlaybackRate(f64),
    /// Larger storage for a unit whose length is known
    Preallocate(Vec<f32>),
}

/// Renderer to orchestrator messages
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// First audible sample of the unit is about to render
    Started { unit: u64 },
    /// Throttled position report
    Progress {
        unit: u64,
        progress: f64,
        read_pos: f64,
        write_pos: u64,
        samples_consumed: u64,
    },
    /// The unit drained after completion
    Ended { unit: u64, samples_consumed: u64 },
}

impl RendererEvent {
    pub fn unit(&self) -> u64 {
        match self {
            RendererEvent::Started { unit }
            | RendererEvent::Progress { unit, .. }
            | RendererEvent::Ended { unit, .. } => *unit,
        }
    }
}

/// Create a connected renderer and handle.
///
/// The renderer goes to the audio thread; the handle and event receiver stay
/// with the orchestrator.
pub fn renderer_channel(
    sample_rate: u32,
    buffer: StreamingPlaybackBuffer,
) -> (RendererHandle, Renderer, mpsc::UnboundedReceiver<RendererEvent>) {
    let (producer, consumer) = HeapRb::<RendererCommand>::new(COMMAND_QUEUE_CAPACITY).split();
    let (retired_tx, retired_rx) = HeapRb::<Vec<f32>>::new(RETIRED_QUEUE_CAPACITY).split();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let progress_interval = (sample_rate / PROGRESS_EVENTS_PER_SECOND).max(1) as usize;
    let initial_capacity = buffer.initial_capacity();
    let planned_capacity = buffer.capacity();

    let renderer = Renderer {
        buffer,
        commands: consumer,
        retired: retired_tx,
        events: event_tx,
        unit: 0,
        progress_interval,
        frames_since_progress: 0,
        dropped_events: 0,
        retire_overflows: 0,
    };

    let handle = RendererHandle {
        producer,
        retired: retired_rx,
        backlog: VecDeque::new(),
        unit: 0,
        overruns: 0,
        initial_capacity,
        planned_capacity,
        spare: None,
    };

    (handle, renderer, event_rx)
}

/// Audio-thread side: drains commands and renders samples
pub struct Renderer {
    buffer: StreamingPlaybackBuffer,
    commands: HeapCons<RendererCommand>,
    retired: HeapProd<Vec<f32>>,
    events: mpsc::UnboundedSender<RendererEvent>,
    unit: u64,
    progress_interval: usize,
    frames_since_progress: usize,
    dropped_events: u64,
    retire_overflows: u64,
}

impl Renderer {
    /// Fill a mono output buffer
    pub fn render(&mut self, out: &mut [f32]) {
        self.render_interleaved(out, 1);
    }

    /// Fill an interleaved buffer, copying the mono signal to every channel
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for block in data.chunks_mut(RENDER_QUANTUM_FRAMES * channels) {
            self.drain_commands();

            let mut frames = 0;
            for frame in block.chunks_mut(channels) {
                let sample = self.buffer.render_sample();
                frame.fill(sample);
                frames += 1;
            }

            self.after_quantum(frames);
        }
    }

    /// Apply the commands queued before this quantum began
    fn drain_commands(&mut self) {
        let pending = self.commands.occupied_len();
        for _ in 0..pending {
            match self.commands.try_pop() {
                Some(command) => self.apply(command),
                None => break,
            }
        }
    }

    fn apply(&mut self, command: RendererCommand) {
        match command {
            RendererCommand::Append(chunk) => {
                let started = self.buffer.append(chunk.samples());
                self.retire(chunk.into_samples());
                if started {
                    self.emit(RendererEvent::Started { unit: self.unit });
                }
            }
            RendererCommand::Complete => {
                if self.buffer.mark_complete() {
                    self.emit(RendererEvent::Started { unit: self.unit });
                }
            }
            RendererCommand::Reset { unit, storage } => {
                let old = self.buffer.reset_with(storage);
                self.retire(old);
                self.unit = unit;
                self.frames_since_progress = 0;
            }
            RendererCommand::Pause => self.buffer.pause(),
            RendererCommand::Resume => self.buffer.resume(),
            RendererCommand::SetPlaybackRate(rate) => {
                self.buffer.set_playback_rate(rate);
            }
            RendererCommand::Preallocate(storage) => {
                let unused = self.buffer.adopt_storage(storage);
                self.retire(unused);
            }
        }
    }

    /// Hand storage back to the orchestrator to be freed
    fn retire(&mut self, storage: Vec<f32>) {
        if storage.capacity() == 0 {
            return;
        }
        if let Err(storage) = self.retired.try_push(storage) {
            self.retire_overflows += 1;
            if self.retire_overflows % 1000 == 1 {
                trace!("Retired storage ring full (total: {})", self.retire_overflows);
            }
            drop(storage);
        }
    }

    fn after_quantum(&mut self, frames: usize) {
        if self.buffer.take_ended() {
            let samples_consumed = self.buffer.samples_consumed();
            self.emit(RendererEvent::Ended {
                unit: self.unit,
                samples_consumed,
            });
            return;
        }

        if !self.buffer.is_started()
            || self.buffer.is_paused()
            || self.buffer.completion_state() == CompletionState::Ended
        {
            return;
        }

        self.frames_since_progress += frames;
        if self.frames_since_progress >= self.progress_interval {
            self.frames_since_progress -= self.progress_interval;
            let progress = self.buffer.progress();
            self.emit(RendererEvent::Progress {
                unit: self.unit,
                progress: progress.progress,
                read_pos: progress.read_pos,
                write_pos: progress.write_pos,
                samples_consumed: progress.samples_consumed,
            });
        }
    }

    fn emit(&mut self, event: RendererEvent) {
        if self.events.send(event).is_err() {
            self.dropped_events += 1;
            if self.dropped_events % 1000 == 1 {
                trace!("Renderer event receiver gone (dropped: {})", self.dropped_events);
            }
        }
    }

    pub fn unit(&self) -> u64 {
        self.unit
    }

    pub fn buffer(&self) -> &StreamingPlaybackBuffer {
        &self.buffer
    }
}

/// Orchestrator side of the command ring
///
/// Commands that do not fit in the ring wait in a local FIFO backlog and are
/// pushed ahead of any newer command, so ordering is preserved.
pub struct RendererHandle {
    producer: HeapProd<RendererCommand>,
    retired: HeapCons<Vec<f32>>,
    backlog: VecDeque<RendererCommand>,
    unit: u64,
    overruns: u64,
    initial_capacity: usize,
    /// Storage length the renderer will hold once queued commands apply
    planned_capacity: usize,
    /// Recycled storage for the next reset
    spare: Option<Vec<f32>>,
}

impl RendererHandle {
    pub fn append(&mut self, chunk: AudioChunk) {
        self.send(RendererCommand::Append(chunk));
    }

    pub fn complete(&mut self) {
        self.send(RendererCommand::Complete);
    }

    /// Start a new playback unit and return its number
    pub fn reset(&mut self) -> u64 {
        self.unit += 1;
        let unit = self.unit;
        self.reclaim();
        let storage = self
            .spare
            .take()
            .unwrap_or_else(|| vec![0.0; self.initial_capacity]);
        self.planned_capacity = self.initial_capacity;
        self.send(RendererCommand::Reset { unit, storage });
        debug!("Renderer reset to unit {}", unit);
        unit
    }

    pub fn pause(&mut self) {
        self.send(RendererCommand::Pause);
    }

    pub fn resume(&mut self) {
        self.send(RendererCommand::Resume);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.send(RendererCommand::SetPlaybackRate(rate));
    }

    /// Make room for a unit of `samples` plus headroom. Never shrinks.
    pub fn preallocate(&mut self, samples: usize) {
        let target = preallocation_len(samples);
        if target <= self.planned_capacity {
            return;
        }
        self.planned_capacity = target;
        self.send(RendererCommand::Preallocate(vec![0.0; target]));
    }

    /// Free storage the renderer has retired; returns how many were freed.
    ///
    /// One buffer of the initial size is kept for the next reset.
    pub fn reclaim(&mut self) -> usize {
        let mut freed = 0;
        while let Some(storage) = self.retired.try_pop() {
            if self.spare.is_none() && storage.len() == self.initial_capacity {
                self.spare = Some(storage);
            } else {
                drop(storage);
                freed += 1;
            }
        }
        freed
    }

    /// Reclaim retired storage, then push backlogged commands into the
    /// ring; returns how many commands remain
    pub fn flush(&mut self) -> usize {
        self.reclaim();
        while let Some(command) = self.backlog.pop_front() {
            if let Err(command) = self.producer.try_push(command) {
                self.backlog.push_front(command);
                break;
            }
        }
        self.backlog.len()
    }

    fn send(&mut self, command: RendererCommand) {
        if self.flush() > 0 {
            self.backlog.push_back(command);
            return;
        }

        if let Err(command) = self.producer.try_push(command) {
            self.overruns += 1;
            if self.overruns % 1000 == 1 {
                warn!("Renderer command ring full (total overruns: {})", self.overruns);
            }
            self.backlog.push_back(command);
        }
    }

    /// Unit opened by the most recent reset
    pub fn current_unit(&self) -> u64 {
        self.unit
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}
