//! Per-session state for the session handshake.
//!
//! A session starts `Idle`. A submission made before the operator has set
//! the response option moves it to `AwaitingOption` with the submission
//! stashed. Setting the option moves it through `Processing` (the stash is
//! handed out exactly once) to `Done`, after which the session's submissions
//! are answered immediately.

use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::SessionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A submission held until the operator answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashedSubmission {
    pub encrypted_text: String,
    pub decrypted_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    AwaitingOption {
        pending_data: StashedSubmission,
    },
    Processing,
    Done,
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub response_set: bool,
    pub phase: SessionPhase,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            response_set: false,
            phase: SessionPhase::Idle,
            last_seen: Instant::now(),
        }
    }
}

/// Session id → session state, with idle expiry and a cap on live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionId, SessionEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Existing session, or a new one if the cap allows it.
    ///
    /// At the cap, idle sessions are swept first.
    fn entry(&mut self, id: SessionId) -> RelayResult<&mut SessionEntry> {
        if !self.sessions.contains_key(&id) && self.sessions.len() >= self.max_entries {
            self.remove_idle_at(Instant::now());
            if self.sessions.len() >= self.max_entries {
                warn!(
                    sessions = self.sessions.len(),
                    limit = self.max_entries,
                    "Session store full, rejecting new session"
                );
                return Err(RelayError::SessionStoreFull {
                    capacity: self.max_entries,
                });
            }
        }

        let entry = self.sessions.entry(id).or_insert_with(SessionEntry::new);
        entry.last_seen = Instant::now();
        Ok(entry)
    }

    pub fn get(&self, id: &SessionId) -> Option<&SessionEntry> {
        self.sessions.get(id)
    }

    /// Whether the operator has already set the option for this session.
    pub fn response_set(&self, id: &SessionId) -> bool {
        self.sessions.get(id).is_some_and(|s| s.response_set)
    }

    /// Hold a submission until the option is set.
    ///
    /// A newer submission replaces an older unanswered one; the replaced
    /// submission is returned.
    pub fn stash(
        &mut self,
        id: SessionId,
        submission: StashedSubmission,
    ) -> RelayResult<Option<StashedSubmission>> {
        let entry = self.entry(id)?;
        let previous = match std::mem::take(&mut entry.phase) {
            SessionPhase::AwaitingOption { pending_data } => Some(pending_data),
            _ => None,
        };
        entry.phase = SessionPhase::AwaitingOption {
            pending_data: submission,
        };
        debug!(session_id = %id, replaced = previous.is_some(), "Stashed submission");
        Ok(previous)
    }

    /// Record that the operator set the option; hand out the stash if present.
    ///
    /// The returned submission must be finished with
    /// [`SessionStore::finish_processing`].
    pub fn mark_response_set(&mut self, id: SessionId) -> RelayResult<Option<StashedSubmission>> {
        let entry = self.entry(id)?;
        entry.response_set = true;
        match std::mem::take(&mut entry.phase) {
            SessionPhase::AwaitingOption { pending_data } => {
                entry.phase = SessionPhase::Processing;
                debug!(session_id = %id, "Processing stashed submission");
                Ok(Some(pending_data))
            }
            other => {
                entry.phase = other;
                Ok(None)
            }
        }
    }

    pub fn finish_processing(&mut self, id: SessionId) {
        if let Some(entry) = self.sessions.get_mut(&id) {
            if entry.phase == SessionPhase::Processing {
                entry.phase = SessionPhase::Done;
            }
        }
    }

    /// Submission stashed for this session, if it is still waiting.
    pub fn stashed(&self, id: &SessionId) -> Option<&StashedSubmission> {
        match self.sessions.get(id).map(|s| &s.phase) {
            Some(SessionPhase::AwaitingOption { pending_data }) => Some(pending_data),
            _ => None,
        }
    }

    /// Drop sessions idle for longer than the TTL, as seen at `now`.
    pub fn remove_idle_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| now.saturating_duration_since(s.last_seen) <= ttl);
        before - self.sessions.len()
    }

    pub fn remove_idle(&mut self) -> usize {
        self.remove_idle_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
