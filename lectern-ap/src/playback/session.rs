//! Playback session bookkeeping
//!
//! A session is one attempt to play one sentence. It owns a cancellation
//! token; aborting the session cancels the token, and everything working on
//! its behalf (synthesis, decode, feed) checks the token before applying a
//! result.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Starting,
    Playing,
    Paused,
    Ended,
    Aborted,
}

impl SessionPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, SessionPhase::Ended | SessionPhase::Aborted)
    }
}

/// Identity plus cancellation for one session
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub id: Uuid,
    cancel: CancellationToken,
}

impl SessionToken {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl PartialEq for SessionToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub sentence_id: String,
    pub sentence_index: usize,
    pub chapter_index: usize,
    pub is_paused: bool,
    pub phase: SessionPhase,
    /// Renderer unit carrying this session's audio, once reset
    pub unit: Option<u64>,
}

/// Result of [`SessionSlot::start`]
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Same sentence already has a live session
    Existing(SessionToken),
    /// A new session; `superseded` is the session it aborted, if any
    Started {
        token: SessionToken,
        superseded: Option<Uuid>,
    },
}

impl StartOutcome {
    pub fn token(&self) -> &SessionToken {
        match self {
            StartOutcome::Existing(token) => token,
            StartOutcome::Started { token, .. } => token,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

/// Holder of the single current session
///
/// Not synchronized; the coordinator keeps it behind its own lock.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Option<Session>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for `sentence_id`, reusing a live one for the same
    /// sentence. Any other session is aborted first.
    pub fn start(&mut self, sentence_id: &str, sentence_index: usize, chapter_index: usize) -> StartOutcome {
        if let Some(session) = &self.current {
            if session.sentence_id == sentence_id
                && !session.token.is_cancelled()
                && !session.phase.is_finished()
            {
                return StartOutcome::Existing(session.token.clone());
            }
        }

        let superseded = self.abort();
        let token = SessionToken::new();
        debug!("Session {} started for sentence {}", token.id, sentence_id);

        self.current = Some(Session {
            token: token.clone(),
            sentence_id: sentence_id.to_string(),
            sentence_index,
            chapter_index,
            is_paused: false,
            phase: SessionPhase::Starting,
            unit: None,
        });

        StartOutcome::Started { token, superseded }
    }

    /// Abort and clear the current session
    pub fn end(&mut self) -> Option<Session> {
        let session = self.current.take()?;
        session.token.cancel();
        debug!("Session {} ended", session.token.id);
        Some(session)
    }

    /// Cancel the current session's token and mark it aborted, keeping it
    /// visible. Returns the aborted session id.
    pub fn abort(&mut self) -> Option<Uuid> {
        let session = self.current.as_mut()?;
        if session.token.is_cancelled() {
            return None;
        }
        session.token.cancel();
        session.phase = SessionPhase::Aborted;
        Some(session.token.id)
    }

    /// Abort only if `token` is still the current session
    pub fn abort_if_current(&mut self, token: &SessionToken) -> bool {
        if self.is_current(token) {
            self.abort().is_some()
        } else {
            false
        }
    }

    /// Update the pause flag without aborting
    pub fn set_paused(&mut self, paused: bool) {
        if let Some(session) = self.current.as_mut() {
            session.is_paused = paused;
            match (paused, session.phase) {
                (true, SessionPhase::Playing) => session.phase = SessionPhase::Paused,
                (false, SessionPhase::Paused) => session.phase = SessionPhase::Playing,
                _ => {}
            }
        }
    }

    pub fn set_unit(&mut self, token: &SessionToken, unit: u64) {
        if let Some(session) = self.current_for(token) {
            session.unit = Some(unit);
        }
    }

    /// The renderer started this unit
    pub fn mark_playing(&mut self, unit: u64) -> Option<&Session> {
        let session = self.current.as_mut()?;
        if session.unit != Some(unit) || session.phase.is_finished() {
            return None;
        }
        session.phase = if session.is_paused {
            SessionPhase::Paused
        } else {
            SessionPhase::Playing
        };
        Some(session)
    }

    /// The renderer finished this unit
    pub fn mark_ended(&mut self, unit: u64) -> Option<Session> {
        let session = self.current.as_mut()?;
        if session.unit != Some(unit) || session.phase.is_finished() {
            return None;
        }
        session.phase = SessionPhase::Ended;
        Some(session.clone())
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.current
            .as_ref()
            .map_or(SessionPhase::Idle, |s| s.phase)
    }

    pub fn is_paused(&self) -> bool {
        self.current.as_ref().is_some_and(|s| s.is_paused)
    }

    pub fn is_current(&self, token: &SessionToken) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.token == *token && !s.token.is_cancelled())
    }

    fn current_for(&mut self, token: &SessionToken) -> Option<&mut Session> {
        self.current.as_mut().filter(|s| s.token == *token)
    }
}
