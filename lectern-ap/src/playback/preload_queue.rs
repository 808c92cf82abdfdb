//! Priority queue of preload tasks
//!
//! Nearest sentence to the playhead first; ties go to the earlier enqueue.

use crate::playback::playlist::Sentence;
use std::collections::BinaryHeap;

/// Lifecycle of one preload task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadTaskState {
    Queued,
    InFlight,
    Done,
    Cancelled,
}

/// Request to synthesize a sentence ahead of the playhead
#[derive(Debug, Clone)]
pub struct PreloadTask {
    pub sentence: Sentence,
    pub sentence_index: usize,
    /// Sentences between the playhead and this one
    pub distance: usize,
    pub state: PreloadTaskState,
    seq: u64,
}

impl PreloadTask {
    fn priority(&self) -> (usize, u64) {
        (self.distance, self.seq)
    }
}

/// Smaller (distance, seq) pops first
impl Ord for PreloadTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.priority().cmp(&self.priority())
    }
}

impl PartialOrd for PreloadTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PreloadTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority() == other.priority()
    }
}

impl Eq for PreloadTask {}

#[derive(Debug, Default)]
pub struct PreloadQueue {
    heap: BinaryHeap<PreloadTask>,
    next_seq: u64,
}

impl PreloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sentence: Sentence, sentence_index: usize, distance: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(PreloadTask {
            sentence,
            sentence_index,
            distance,
            state: PreloadTaskState::Queued,
            seq,
        });
    }

    pub fn pop(&mut self) -> Option<PreloadTask> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&PreloadTask> {
        self.heap.peek()
    }

    pub fn contains(&self, sentence_id: &str) -> bool {
        self.heap.iter().any(|t| t.sentence.id == sentence_id)
    }

    /// Remove and return every task matching `predicate`, marked cancelled
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<PreloadTask>
    where
        F: Fn(&PreloadTask) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.heap).into_iter().partition(|t| predicate(t));
        self.heap = kept.into();

        removed
            .into_iter()
            .map(|mut t| {
                t.state = PreloadTaskState::Cancelled;
                t
            })
            .collect()
    }

    /// Empty the queue, returning the tasks marked cancelled
    pub fn clear(&mut self) -> Vec<PreloadTask> {
        self.remove_where(|_| true)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
