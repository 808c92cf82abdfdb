//! Per-sentence lifecycle tracking
//!
//! Every state change is validated against
//! [`SentenceState::can_transition_to`] and published as a
//! `SentenceStateChanged` event. Illegal requests are rejected and logged,
//! never applied silently.

use lectern_common::events::{EventBus, LecternEvent, SentenceState};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Sentence id to lifecycle state; unknown sentences are `Pending`
pub struct SentenceStateTracker {
    states: RwLock<HashMap<String, SentenceState>>,
    event_bus: EventBus,
}

impl SentenceStateTracker {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            event_bus,
        }
    }

    pub async fn get(&self, sentence_id: &str) -> SentenceState {
        self.states
            .read()
            .await
            .get(sentence_id)
            .copied()
            .unwrap_or_default()
    }

    /// Apply a legal transition.
    ///
    /// Returns true if the sentence is in `to` afterwards. Requesting the
    /// current state is a no-op that returns true.
    pub async fn transition(&self, sentence_id: &str, to: SentenceState) -> bool {
        let from = {
            let mut states = self.states.write().await;
            let from = states.get(sentence_id).copied().unwrap_or_default();
            if from == to {
                return true;
            }
            if !from.can_transition_to(to) {
                warn!(
                    "Rejected sentence transition {} -> {} for {}",
                    from, to, sentence_id
                );
                return false;
            }
            states.insert(sentence_id.to_string(), to);
            from
        };

        self.publish(sentence_id, from, to);
        true
    }

    /// Transition only when the current state is one of `expected`.
    ///
    /// Background work uses this so a late result cannot overwrite a state
    /// the foreground has since moved on from.
    pub async fn transition_if(
        &self,
        sentence_id: &str,
        expected: &[SentenceState],
        to: SentenceState,
    ) -> bool {
        let from = {
            let mut states = self.states.write().await;
            let from = states.get(sentence_id).copied().unwrap_or_default();
            if !expected.contains(&from) || !from.can_transition_to(to) {
                return false;
            }
            states.insert(sentence_id.to_string(), to);
            from
        };

        self.publish(sentence_id, from, to);
        true
    }

    /// Return every tracked sentence to `Pending`, except those `keep` selects.
    ///
    /// Used when voice or speech rate changes invalidate produced audio.
    /// States with no legal edge to `Pending` (a `Playing` sentence) are
    /// left in place whatever `keep` says.
    pub async fn reset_where<F>(&self, keep: F) -> usize
    where
        F: Fn(SentenceState) -> bool,
    {
        let changed: Vec<(String, SentenceState)> = {
            let mut states = self.states.write().await;
            let mut changed = Vec::new();
            for (id, state) in states.iter_mut() {
                if *state != SentenceState::Pending
                    && !keep(*state)
                    && state.can_transition_to(SentenceState::Pending)
                {
                    changed.push((id.clone(), *state));
                    *state = SentenceState::Pending;
                }
            }
            changed
        };

        for (id, from) in &changed {
            self.publish(id, *from, SentenceState::Pending);
        }
        debug!("Reset {} sentences to pending", changed.len());
        changed.len()
    }

    /// Replace the tracked set with `sentence_ids`, all `Pending`
    pub async fn load<'a, I>(&self, sentence_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut states = self.states.write().await;
        states.clear();
        for id in sentence_ids {
            states.insert(id.to_string(), SentenceState::Pending);
        }
    }

    /// States for the given ids, in order
    pub async fn snapshot<'a, I>(&self, sentence_ids: I) -> Vec<(String, SentenceState)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let states = self.states.read().await;
        sentence_ids
            .into_iter()
            .map(|id| (id.to_string(), states.get(id).copied().unwrap_or_default()))
            .collect()
    }

    fn publish(&self, sentence_id: &str, old_state: SentenceState, new_state: SentenceState) {
        debug!("Sentence {}: {} -> {}", sentence_id, old_state, new_state);
        self.event_bus.emit_lossy(LecternEvent::SentenceStateChanged {
            sentence_id: sentence_id.to_string(),
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }
}
