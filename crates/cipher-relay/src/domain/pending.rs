//! Pending request registry for the redirect handshake.
//!
//! Flow:
//! 1. A submission arrives under the redirect policy
//! 2. `create()` parks it under a fresh `PendingId`
//! 3. The client is redirected to the operator form carrying that id
//! 4. The operator posts the form; `take()` removes the entry exactly once
//! 5. `complete()` sends the receipt to a client waiting on
//!    `GET /pending/:id`, or holds it until that client's next poll
//!
//! Open and answered entries expire after a TTL, and together count against
//! the registry's cap, so an operator or client who never shows up cannot
//! grow it without bound.

use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::PendingId;
use crate::domain::types::SubmissionReceipt;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A parked submission.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: PendingId,
    pub encrypted_text: String,
    pub decrypted_text: String,
    pub created_at: Instant,
    completion: oneshot::Sender<SubmissionReceipt>,
    waiter: Option<oneshot::Receiver<SubmissionReceipt>>,
}

/// What a client asking for a pending request's answer gets.
#[derive(Debug)]
pub enum PendingWait {
    /// Answered while nobody was waiting; handed out once
    Ready(SubmissionReceipt),
    /// Still open; the receipt arrives on this channel
    Waiting(oneshot::Receiver<SubmissionReceipt>),
}

/// Answer held for a client that was not waiting when it arrived.
#[derive(Debug)]
struct HeldReceipt {
    receipt: SubmissionReceipt,
    completed_at: Instant,
}

/// Registry counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingStats {
    pub registered: u64,
    pub completed: u64,
    pub delivered: u64,
    pub expired: u64,
    pub rejected: u64,
}

/// Identifier → parked submission, plus answers awaiting pickup.
///
/// Not internally synchronized; the relay core holds it behind its lock.
#[derive(Debug)]
pub struct PendingRegistry {
    pending: HashMap<PendingId, PendingRequest>,
    held: HashMap<PendingId, HeldReceipt>,
    ttl: Duration,
    max_entries: usize,
    stats: PendingStats,
}

impl PendingRegistry {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            pending: HashMap::new(),
            held: HashMap::new(),
            ttl,
            max_entries,
            stats: PendingStats::default(),
        }
    }

    /// Park a submission and return its identifier.
    pub fn create(
        &mut self,
        encrypted_text: impl Into<String>,
        decrypted_text: impl Into<String>,
    ) -> RelayResult<PendingId> {
        let occupied = self.pending.len() + self.held.len();
        if occupied >= self.max_entries {
            self.stats.rejected += 1;
            warn!(
                pending = self.pending.len(),
                held = self.held.len(),
                limit = self.max_entries,
                "Pending registry full, rejecting submission"
            );
            return Err(RelayError::RegistryFull {
                capacity: self.max_entries,
            });
        }

        let mut id = PendingId::new();
        while self.pending.contains_key(&id) || self.held.contains_key(&id) {
            id = PendingId::new();
        }
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            id,
            PendingRequest {
                id,
                encrypted_text: encrypted_text.into(),
                decrypted_text: decrypted_text.into(),
                created_at: Instant::now(),
                completion: tx,
                waiter: Some(rx),
            },
        );
        self.stats.registered += 1;

        debug!(pending_id = %id, "Registered pending request");
        Ok(id)
    }

    /// Remove and return an open request. A second call for the same id fails.
    pub fn take(&mut self, id: &PendingId) -> RelayResult<PendingRequest> {
        match self.pending.remove(id) {
            Some(request) => {
                self.stats.completed += 1;
                debug!(
                    pending_id = %id,
                    age_ms = request.created_at.elapsed().as_millis(),
                    "Took pending request"
                );
                Ok(request)
            }
            None => {
                warn!(pending_id = %id, "Unknown or already completed pending request");
                Err(RelayError::UnknownPendingIdentifier(*id))
            }
        }
    }

    /// Deliver the final receipt of a taken request.
    ///
    /// Returns true when a waiting client received it. Otherwise the receipt
    /// is held until the client's next [`PendingRegistry::claim_waiter`].
    pub fn complete(&mut self, request: PendingRequest, receipt: SubmissionReceipt) -> bool {
        let PendingRequest {
            id,
            completion,
            waiter,
            ..
        } = request;

        let receipt = match waiter {
            // receiver never claimed, or put back after a timed-out wait
            Some(_) => receipt,
            None => match completion.send(receipt) {
                Ok(()) => {
                    self.stats.delivered += 1;
                    return true;
                }
                Err(receipt) => receipt,
            },
        };

        debug!(pending_id = %id, "Holding receipt for pickup");
        self.held.insert(
            id,
            HeldReceipt {
                receipt,
                completed_at: Instant::now(),
            },
        );
        false
    }

    /// Answer a client asking for a request's outcome.
    ///
    /// A held receipt is handed out once. For an open request the receiving
    /// half of its completion channel is handed out, one waiter at a time; it
    /// must be returned with [`PendingRegistry::restore_waiter`] if the
    /// client stops waiting early.
    pub fn claim_waiter(&mut self, id: &PendingId) -> RelayResult<PendingWait> {
        if let Some(held) = self.held.remove(id) {
            self.stats.delivered += 1;
            debug!(pending_id = %id, "Handing out held receipt");
            return Ok(PendingWait::Ready(held.receipt));
        }

        let request = self
            .pending
            .get_mut(id)
            .ok_or(RelayError::UnknownPendingIdentifier(*id))?;
        request
            .waiter
            .take()
            .map(PendingWait::Waiting)
            .ok_or(RelayError::AlreadyAwaited(*id))
    }

    /// Put a waiter back after a timed-out wait.
    ///
    /// Gives the receiver back when the request is no longer open, so the
    /// caller can still read a receipt that arrived in the meantime.
    pub fn restore_waiter(
        &mut self,
        id: &PendingId,
        waiter: oneshot::Receiver<SubmissionReceipt>,
    ) -> Result<(), oneshot::Receiver<SubmissionReceipt>> {
        match self.pending.get_mut(id) {
            Some(request) => {
                request.waiter = Some(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Remove open requests and held receipts older than the TTL, as seen
    /// at `now`.
    pub fn remove_expired_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.pending.len() + self.held.len();

        self.pending.retain(|id, request| {
            let age = now.saturating_duration_since(request.created_at);
            if age > ttl {
                warn!(
                    pending_id = %id,
                    age_ms = age.as_millis(),
                    ttl_ms = ttl.as_millis(),
                    "Removing expired pending request"
                );
                false
            } else {
                true
            }
        });
        self.held.retain(|id, held| {
            let keep = now.saturating_duration_since(held.completed_at) <= ttl;
            if !keep {
                debug!(pending_id = %id, "Dropping unclaimed receipt");
            }
            keep
        });

        let removed = before - (self.pending.len() + self.held.len());
        self.stats.expired += removed as u64;
        removed
    }

    pub fn remove_expired(&mut self) -> usize {
        self.remove_expired_at(Instant::now())
    }

    pub fn peek(&self, id: &PendingId) -> Option<&PendingRequest> {
        self.pending.get(id)
    }

    /// Open requests
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Answered requests whose client has not picked up the receipt
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    pub fn stats(&self) -> PendingStats {
        self.stats
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PendingRegistry {
        PendingRegistry::new(Duration::from_secs(30), 8)
    }

    fn claim_channel(reg: &mut PendingRegistry, id: &PendingId) -> oneshot::Receiver<SubmissionReceipt> {
        match reg.claim_waiter(id).unwrap() {
            PendingWait::Waiting(rx) => rx,
            PendingWait::Ready(_) => panic!("expected an open request"),
        }
    }

    fn claim_ready(reg: &mut PendingRegistry, id: &PendingId) -> SubmissionReceipt {
        match reg.claim_waiter(id).unwrap() {
            PendingWait::Ready(receipt) => receipt,
            PendingWait::Waiting(_) => panic!("expected a held receipt"),
        }
    }

    #[test]
    fn test_create_and_take_once() {
        let mut reg = registry();
        let id = reg.create("Khoor", "Hello").unwrap();

        assert_eq!(reg.peek(&id).unwrap().decrypted_text, "Hello");
        let request = reg.take(&id).unwrap();
        assert_eq!(request.id, id);
        assert_eq!(request.encrypted_text, "Khoor");
        assert_eq!(request.decrypted_text, "Hello");

        assert_eq!(
            reg.take(&id).unwrap_err(),
            RelayError::UnknownPendingIdentifier(id)
        );
        assert!(reg.is_empty());
        assert!(reg.peek(&id).is_none());
    }

    #[test]
    fn test_take_unknown_id() {
        let mut reg = registry();
        let id = PendingId::new();
        assert!(matches!(
            reg.take(&id),
            Err(RelayError::UnknownPendingIdentifier(_))
        ));
        assert!(matches!(
            reg.claim_waiter(&id),
            Err(RelayError::UnknownPendingIdentifier(_))
        ));
    }

    #[test]
    fn test_identifiers_are_unique() {
        let mut reg = registry();
        let a = reg.create("a", "x").unwrap();
        let b = reg.create("a", "x").unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_cap_rejects_new_entries() {
        let mut reg = PendingRegistry::new(Duration::from_secs(30), 2);
        reg.create("a", "a").unwrap();
        reg.create("b", "b").unwrap();
        assert_eq!(
            reg.create("c", "c").unwrap_err(),
            RelayError::RegistryFull { capacity: 2 }
        );
        assert_eq!(reg.stats().rejected, 1);
    }

    #[test]
    fn test_held_receipts_count_against_cap() {
        let mut reg = PendingRegistry::new(Duration::from_secs(30), 2);
        let a = reg.create("a", "a").unwrap();
        reg.create("b", "b").unwrap();

        let request = reg.take(&a).unwrap();
        reg.complete(request, SubmissionReceipt::success("a", "X"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.held_len(), 1);
        assert!(matches!(
            reg.create("c", "c"),
            Err(RelayError::RegistryFull { .. })
        ));

        claim_ready(&mut reg, &a);
        assert!(reg.create("c", "c").is_ok());
    }

    #[test]
    fn test_remove_expired() {
        let mut reg = PendingRegistry::new(Duration::from_secs(5), 8);
        let id1 = reg.create("a", "a").unwrap();
        let id2 = reg.create("b", "b").unwrap();
        let id3 = reg.create("c", "c").unwrap();
        let request = reg.take(&id3).unwrap();
        reg.complete(request, SubmissionReceipt::success("c", "X"));

        assert_eq!(reg.remove_expired_at(Instant::now()), 0);

        let later = Instant::now() + Duration::from_secs(6);
        assert_eq!(reg.remove_expired_at(later), 3);
        assert!(reg.peek(&id1).is_none());
        assert!(reg.peek(&id2).is_none());
        assert_eq!(reg.held_len(), 0);
        assert!(matches!(
            reg.claim_waiter(&id3),
            Err(RelayError::UnknownPendingIdentifier(_))
        ));
        assert_eq!(reg.stats().expired, 3);
    }

    #[tokio::test]
    async fn test_completion_reaches_waiter() {
        let mut reg = registry();
        let id = reg.create("Khoor", "Hello").unwrap();
        let waiter = claim_channel(&mut reg, &id);

        let request = reg.take(&id).unwrap();
        assert!(reg.complete(request, SubmissionReceipt::success("Hello", "X")));
        assert_eq!(reg.held_len(), 0);

        let receipt = waiter.await.unwrap();
        assert_eq!(receipt.decrypted_text, "Hello");
        assert_eq!(receipt.response_option, "X");
    }

    #[test]
    fn test_completion_without_waiter_is_held_once() {
        let mut reg = registry();
        let id = reg.create("a", "a").unwrap();
        let request = reg.take(&id).unwrap();
        assert!(!reg.complete(request, SubmissionReceipt::success("a", "X")));

        assert_eq!(claim_ready(&mut reg, &id).response_option, "X");
        assert!(matches!(
            reg.claim_waiter(&id),
            Err(RelayError::UnknownPendingIdentifier(_))
        ));
        assert_eq!(reg.stats().delivered, 1);
    }

    #[test]
    fn test_completion_after_restored_waiter_is_held() {
        let mut reg = registry();
        let id = reg.create("a", "b").unwrap();
        let waiter = claim_channel(&mut reg, &id);
        assert!(reg.restore_waiter(&id, waiter).is_ok());

        let request = reg.take(&id).unwrap();
        assert!(!reg.complete(request, SubmissionReceipt::success("b", "opt")));
        assert_eq!(claim_ready(&mut reg, &id).decrypted_text, "b");
    }

    #[test]
    fn test_completion_after_waiter_dropped_is_held() {
        let mut reg = registry();
        let id = reg.create("a", "b").unwrap();
        drop(claim_channel(&mut reg, &id));

        let request = reg.take(&id).unwrap();
        assert!(!reg.complete(request, SubmissionReceipt::success("b", "opt")));
        assert_eq!(claim_ready(&mut reg, &id).decrypted_text, "b");
    }

    #[test]
    fn test_single_waiter() {
        let mut reg = registry();
        let id = reg.create("a", "a").unwrap();
        let waiter = claim_channel(&mut reg, &id);
        assert_eq!(
            reg.claim_waiter(&id).unwrap_err(),
            RelayError::AlreadyAwaited(id)
        );

        assert!(reg.restore_waiter(&id, waiter).is_ok());
        assert!(matches!(
            reg.claim_waiter(&id),
            Ok(PendingWait::Waiting(_))
        ));
    }

    #[test]
    fn test_restore_after_completion_returns_receipt() {
        let mut reg = registry();
        let id = reg.create("a", "b").unwrap();
        let waiter = claim_channel(&mut reg, &id);

        let request = reg.take(&id).unwrap();
        assert!(reg.complete(request, SubmissionReceipt::success("b", "opt")));

        let mut waiter = reg.restore_waiter(&id, waiter).unwrap_err();
        assert_eq!(waiter.try_recv().unwrap().decrypted_text, "b");
    }

    #[test]
    fn test_stats() {
        let mut reg = registry();
        let id = reg.create("a", "a").unwrap();
        reg.create("b", "b").unwrap();
        reg.take(&id).unwrap();

        let stats = reg.stats();
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(reg.max_entries(), 8);
    }
}
