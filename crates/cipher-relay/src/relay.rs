//! Relay core: the single owner of all mutable relay state.
//!
//! The message log, response option, pending registry and session store live
//! behind one mutex so a submission's append-and-trim, and an operator's
//! set-and-complete, are each observed as one step. No lock is held across an
//! `.await`.

use crate::domain::cipher::ShiftCipher;
use crate::domain::config::RelayConfig;
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::{PendingId, SessionId};
use crate::domain::message_log::MessageLog;
use crate::domain::pending::{PendingRegistry, PendingStats, PendingWait};
use crate::domain::response_option::ResponseOption;
use crate::domain::session::{SessionStore, StashedSubmission};
use crate::domain::types::{MessageRecord, ResponsePolicy, SubmissionReceipt, SubmitRequest};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Logged and answered in the same request
    Answered(SubmissionReceipt),
    /// Parked in the pending registry until the operator completes it
    Deferred(PendingId),
    /// Stashed in the client's session until the operator sets the option
    AwaitingOption,
}

/// Result of an operator update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorOutcome {
    /// Option updated; nothing was waiting on it
    Updated,
    /// Option updated and a deferred submission was answered
    Completed(SubmissionReceipt),
}

/// Operator form submission.
#[derive(Debug, Clone, Default)]
pub struct OperatorUpdate {
    /// New option value; `None` keeps the current one
    pub new_response: Option<String>,
    /// Pending submission to complete
    pub pending_id: Option<PendingId>,
    /// Session of the operator, for the session handshake
    pub session: Option<SessionId>,
}

/// Pending registry view for the admin endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSnapshot {
    pub count: usize,
    pub held: usize,
    pub max_entries: usize,
    pub stats: PendingStats,
}

struct RelayState {
    log: MessageLog,
    option: ResponseOption,
    pending: PendingRegistry,
    sessions: SessionStore,
}

impl RelayState {
    fn record(&mut self, encrypted_text: String, decrypted_text: String) -> SubmissionReceipt {
        let record = MessageRecord::now(encrypted_text, Some(decrypted_text.clone()));
        let evicted = self.log.append(record);
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted oldest log records");
        }
        SubmissionReceipt::success(decrypted_text, self.option.get())
    }
}

/// Submission handler and shared state
pub struct RelayCore {
    cipher: ShiftCipher,
    policy: ResponsePolicy,
    state: Mutex<RelayState>,
}

impl RelayCore {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            cipher: config.cipher.to_cipher(),
            policy: config.policy,
            state: Mutex::new(RelayState {
                log: MessageLog::new(config.log.capacity),
                option: ResponseOption::new(config.default_response_option.clone()),
                pending: PendingRegistry::new(config.pending.ttl, config.pending.max_entries),
                sessions: SessionStore::new(config.session.ttl, config.session.max_entries),
            }),
        }
    }

    pub fn policy(&self) -> ResponsePolicy {
        self.policy
    }

    /// Parse a raw `/send_data` body and submit it.
    pub fn submit_body(&self, body: &[u8], session: SessionId) -> RelayResult<SubmitOutcome> {
        let request: SubmitRequest = serde_json::from_slice(body)?;
        self.submit(request, session)
    }

    /// Decrypt a submission and answer, park, or stash it per policy.
    ///
    /// On error the log is untouched.
    pub fn submit(&self, request: SubmitRequest, session: SessionId) -> RelayResult<SubmitOutcome> {
        let encrypted_text = request
            .encrypted_message
            .filter(|m| !m.is_empty())
            .ok_or(RelayError::MissingMessage)?;
        let decrypted_text = self.cipher.decrypt(&encrypted_text);

        let mut state = self.state.lock();
        match self.policy {
            ResponsePolicy::Immediate => {
                Ok(SubmitOutcome::Answered(state.record(encrypted_text, decrypted_text)))
            }
            ResponsePolicy::Redirect => {
                let id = state.pending.create(encrypted_text, decrypted_text)?;
                info!(pending_id = %id, "Submission deferred to operator");
                Ok(SubmitOutcome::Deferred(id))
            }
            ResponsePolicy::Session => {
                if state.sessions.response_set(&session) {
                    return Ok(SubmitOutcome::Answered(
                        state.record(encrypted_text, decrypted_text),
                    ));
                }
                state.sessions.stash(
                    session,
                    StashedSubmission {
                        encrypted_text,
                        decrypted_text,
                    },
                )?;
                info!(session_id = %session, "Submission awaiting response option");
                Ok(SubmitOutcome::AwaitingOption)
            }
        }
    }

    /// Apply an operator update: set the option, then answer whatever was
    /// waiting on it.
    ///
    /// Every fallible step runs before the option changes, so a failed
    /// update (unknown `pending_id`, full session store) leaves it as it was.
    pub fn apply_operator_update(&self, update: OperatorUpdate) -> RelayResult<OperatorOutcome> {
        let mut state = self.state.lock();

        let parked = match update.pending_id {
            Some(id) => Some(state.pending.take(&id)?),
            None => None,
        };

        let stashed = match (&parked, update.session) {
            (None, Some(session)) if self.policy == ResponsePolicy::Session => state
                .sessions
                .mark_response_set(session)?
                .map(|stash| (session, stash)),
            _ => None,
        };

        if let Some(value) = update.new_response {
            state.option.set(value);
            info!(option = state.option.get(), "Response option updated");
        }

        if let Some(request) = parked {
            let id = request.id;
            let receipt =
                state.record(request.encrypted_text.clone(), request.decrypted_text.clone());
            if !state.pending.complete(request, receipt.clone()) {
                debug!(pending_id = %id, "No client waiting, receipt held for pickup");
            }
            info!(pending_id = %id, "Pending request completed");
            return Ok(OperatorOutcome::Completed(receipt));
        }

        if let Some((session, stash)) = stashed {
            let receipt = state.record(stash.encrypted_text, stash.decrypted_text);
            state.sessions.finish_processing(session);
            info!(session_id = %session, "Stashed submission processed");
            return Ok(OperatorOutcome::Completed(receipt));
        }

        Ok(OperatorOutcome::Updated)
    }

    /// `(encrypted_text, decrypted_text)` stashed for a session.
    pub fn session_preview(&self, session: &SessionId) -> Option<(String, String)> {
        self.state
            .lock()
            .sessions
            .stashed(session)
            .map(|s| (s.encrypted_text.clone(), s.decrypted_text.clone()))
    }

    pub fn response_option(&self) -> String {
        self.state.lock().option.get().to_string()
    }

    /// Oldest-first snapshot of the message log.
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.state.lock().log.list()
    }

    /// `(encrypted_text, decrypted_text)` of a parked submission.
    pub fn pending_preview(&self, id: &PendingId) -> Option<(String, String)> {
        self.state
            .lock()
            .pending
            .peek(id)
            .map(|r| (r.encrypted_text.clone(), r.decrypted_text.clone()))
    }

    /// Held receipt, or the completion channel of an open request.
    pub fn claim_waiter(&self, id: &PendingId) -> RelayResult<PendingWait> {
        self.state.lock().pending.claim_waiter(id)
    }

    pub fn restore_waiter(
        &self,
        id: &PendingId,
        waiter: oneshot::Receiver<SubmissionReceipt>,
    ) -> Result<(), oneshot::Receiver<SubmissionReceipt>> {
        self.state.lock().pending.restore_waiter(id, waiter)
    }

    pub fn pending_snapshot(&self) -> PendingSnapshot {
        let state = self.state.lock();
        PendingSnapshot {
            count: state.pending.len(),
            held: state.pending.held_len(),
            max_entries: state.pending.max_entries(),
            stats: state.pending.stats(),
        }
    }

    /// Expire stale pending requests and idle sessions.
    ///
    /// Returns `(pending_removed, sessions_removed)`.
    pub fn sweep(&self) -> (usize, usize) {
        let mut state = self.state.lock();
        (state.pending.remove_expired(), state.sessions.remove_idle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DEFAULT_RESPONSE_OPTION;

    fn core(policy: ResponsePolicy) -> RelayCore {
        let config = RelayConfig {
            policy,
            ..RelayConfig::default()
        };
        RelayCore::new(&config)
    }

    fn submit(text: &str) -> SubmitRequest {
        SubmitRequest {
            encrypted_message: Some(text.to_string()),
        }
    }

    #[test]
    fn test_immediate_submission() {
        let relay = core(ResponsePolicy::Immediate);
        let outcome = relay.submit(submit("Khoor123"), SessionId::new()).unwrap();

        let SubmitOutcome::Answered(receipt) = outcome else {
            panic!("expected an immediate answer");
        };
        assert_eq!(receipt.decrypted_text, "Hello890");
        assert_eq!(receipt.response_option, DEFAULT_RESPONSE_OPTION);

        let messages = relay.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].encrypted_text, "Khoor123");
        assert_eq!(messages[0].decrypted_text.as_deref(), Some("Hello890"));
    }

    #[test]
    fn test_missing_message_leaves_log_unchanged() {
        let relay = core(ResponsePolicy::Immediate);
        relay.submit(submit("abc"), SessionId::new()).unwrap();

        for request in [SubmitRequest::default(), submit("")] {
            assert_eq!(
                relay.submit(request, SessionId::new()).unwrap_err(),
                RelayError::MissingMessage
            );
        }
        assert_eq!(relay.messages().len(), 1);
    }

    #[test]
    fn test_malformed_body() {
        let relay = core(ResponsePolicy::Immediate);
        for body in [&b"not json"[..], b"[1,2]", b"{\"encrypted_message\": 7}"] {
            assert!(matches!(
                relay.submit_body(body, SessionId::new()),
                Err(RelayError::MalformedPayload(_))
            ));
        }
        assert!(relay.messages().is_empty());
    }

    #[test]
    fn test_log_keeps_last_ten() {
        let relay = core(ResponsePolicy::Immediate);
        for n in 0..15 {
            relay.submit(submit(&format!("m{}", n)), SessionId::new()).unwrap();
        }
        let texts: Vec<_> = relay.messages().into_iter().map(|m| m.encrypted_text).collect();
        let expected: Vec<_> = (5..15).map(|n| format!("m{}", n)).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_option_reported_after_set() {
        let relay = core(ResponsePolicy::Immediate);
        relay
            .apply_operator_update(OperatorUpdate {
                new_response: Some("X".into()),
                ..OperatorUpdate::default()
            })
            .unwrap();
        for _ in 0..3 {
            let SubmitOutcome::Answered(receipt) =
                relay.submit(submit("a"), SessionId::new()).unwrap()
            else {
                panic!("expected an immediate answer");
            };
            assert_eq!(receipt.response_option, "X");
        }
    }

    #[test]
    fn test_redirect_flow_completes_once() {
        let relay = core(ResponsePolicy::Redirect);
        let SubmitOutcome::Deferred(id) = relay.submit(submit("Khoor"), SessionId::new()).unwrap()
        else {
            panic!("expected a deferred submission");
        };
        assert!(relay.messages().is_empty());
        assert_eq!(
            relay.pending_preview(&id),
            Some(("Khoor".to_string(), "Hello".to_string()))
        );

        let outcome = relay
            .apply_operator_update(OperatorUpdate {
                new_response: Some("Approved".into()),
                pending_id: Some(id),
                session: None,
            })
            .unwrap();
        let OperatorOutcome::Completed(receipt) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(receipt.decrypted_text, "Hello");
        assert_eq!(receipt.response_option, "Approved");
        assert_eq!(relay.messages().len(), 1);

        let again = relay.apply_operator_update(OperatorUpdate {
            new_response: Some("Other".into()),
            pending_id: Some(id),
            session: None,
        });
        assert_eq!(again.unwrap_err(), RelayError::UnknownPendingIdentifier(id));
        assert_eq!(relay.response_option(), "Approved");
        assert_eq!(relay.messages().len(), 1);
    }

    #[test]
    fn test_session_flow() {
        let relay = core(ResponsePolicy::Session);
        let session = SessionId::new();

        assert_eq!(
            relay.submit(submit("Khoor"), session).unwrap(),
            SubmitOutcome::AwaitingOption
        );
        assert_eq!(
            relay.session_preview(&session),
            Some(("Khoor".to_string(), "Hello".to_string()))
        );
        assert!(relay.messages().is_empty());

        let OperatorOutcome::Completed(receipt) = relay
            .apply_operator_update(OperatorUpdate {
                new_response: Some("Go".into()),
                pending_id: None,
                session: Some(session),
            })
            .unwrap()
        else {
            panic!("expected the stash to be processed");
        };
        assert_eq!(receipt.decrypted_text, "Hello");
        assert_eq!(receipt.response_option, "Go");
        assert!(relay.session_preview(&session).is_none());

        // second update finds nothing left to process
        assert_eq!(
            relay
                .apply_operator_update(OperatorUpdate {
                    new_response: None,
                    pending_id: None,
                    session: Some(session),
                })
                .unwrap(),
            OperatorOutcome::Updated
        );
        assert_eq!(relay.messages().len(), 1);

        // later submissions from the same session are answered directly
        assert!(matches!(
            relay.submit(submit("Zruog"), session).unwrap(),
            SubmitOutcome::Answered(_)
        ));
        assert_eq!(relay.messages().len(), 2);
    }

    #[test]
    fn test_update_without_value_keeps_option() {
        let relay = core(ResponsePolicy::Immediate);
        relay
            .apply_operator_update(OperatorUpdate::default())
            .unwrap();
        assert_eq!(relay.response_option(), DEFAULT_RESPONSE_OPTION);
    }

    #[test]
    fn test_pending_snapshot() {
        let relay = core(ResponsePolicy::Redirect);
        relay.submit(submit("a"), SessionId::new()).unwrap();
        relay.submit(submit("b"), SessionId::new()).unwrap();

        let snapshot = relay.pending_snapshot();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.stats.registered, 2);
        assert_eq!(relay.sweep(), (0, 0));
    }

    #[test]
    fn test_receipt_held_until_client_asks() {
        let relay = core(ResponsePolicy::Redirect);
        let SubmitOutcome::Deferred(id) = relay.submit(submit("Khoor"), SessionId::new()).unwrap()
        else {
            panic!("expected a deferred submission");
        };
        relay
            .apply_operator_update(OperatorUpdate {
                new_response: Some("Later".into()),
                pending_id: Some(id),
                session: None,
            })
            .unwrap();
        assert_eq!(relay.pending_snapshot().held, 1);

        let Ok(PendingWait::Ready(receipt)) = relay.claim_waiter(&id) else {
            panic!("expected the held receipt");
        };
        assert_eq!(receipt.decrypted_text, "Hello");
        assert_eq!(receipt.response_option, "Later");
        assert!(matches!(
            relay.claim_waiter(&id),
            Err(RelayError::UnknownPendingIdentifier(_))
        ));
    }

    #[test]
    fn test_full_session_store_rejects_without_side_effects() {
        let config = RelayConfig {
            policy: ResponsePolicy::Session,
            session: crate::domain::config::SessionConfig {
                max_entries: 1,
                ..Default::default()
            },
            ..RelayConfig::default()
        };
        let relay = RelayCore::new(&config);
        relay.submit(submit("a"), SessionId::new()).unwrap();

        assert_eq!(
            relay.submit(submit("b"), SessionId::new()).unwrap_err(),
            RelayError::SessionStoreFull { capacity: 1 }
        );
        assert_eq!(
            relay
                .apply_operator_update(OperatorUpdate {
                    new_response: Some("Changed".into()),
                    pending_id: None,
                    session: Some(SessionId::new()),
                })
                .unwrap_err(),
            RelayError::SessionStoreFull { capacity: 1 }
        );
        assert_eq!(relay.response_option(), DEFAULT_RESPONSE_OPTION);
        assert!(relay.messages().is_empty());
    }

    #[test]
    fn test_operator_session_ignored_outside_session_policy() {
        let config = RelayConfig {
            session: crate::domain::config::SessionConfig {
                max_entries: 1,
                ..Default::default()
            },
            ..RelayConfig::default()
        };
        let relay = RelayCore::new(&config);
        for n in 0..3 {
            let outcome = relay
                .apply_operator_update(OperatorUpdate {
                    new_response: Some(format!("v{}", n)),
                    pending_id: None,
                    session: Some(SessionId::new()),
                })
                .unwrap();
            assert_eq!(outcome, OperatorOutcome::Updated);
        }
        assert_eq!(relay.response_option(), "v2");
        assert_eq!(relay.policy(), ResponsePolicy::Immediate);
    }
}
