//! Pending-request ledger.
//!
//! The wire protocol has no request ids, so the ledger is a plain FIFO: the
//! next reply always belongs to the oldest slot.  A slot whose caller has
//! already been answered (timeout) stays queued as a tombstone until its own
//! reply arrives, which keeps later replies aligned with later requests.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::types::ClientError;

pub(crate) type Responder<T> = oneshot::Sender<Result<T, ClientError>>;

struct Entry<T> {
    id: u64,
    sent_at: Instant,
    deadline: Option<Instant>,
    /// `None` once settled; the slot is then a tombstone.
    responder: Option<Responder<T>>,
}

/// What happened to the head slot when a reply arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    /// Delivered to the waiting caller (or to a caller that stopped listening).
    Delivered { id: u64 },
    /// The slot had already timed out; the reply was discarded.
    Stale { id: u64 },
    /// Nothing was in flight.
    Empty,
}

pub(crate) struct Ledger<T> {
    entries: VecDeque<Entry<T>>,
    next_id: u64,
}

impl<T> Ledger<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Append a slot for a request that is about to be sent.
    /// A zero `timeout` arms no deadline.
    pub fn push(&mut self, responder: Responder<T>, timeout: Duration, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = (!timeout.is_zero()).then(|| now + timeout);
        self.entries.push_back(Entry {
            id,
            sent_at: now,
            deadline,
            responder: Some(responder),
        });
        id
    }

    /// Consume the head slot with the reply that just arrived.
    pub fn settle_head(&mut self, outcome: Result<T, ClientError>) -> Settled {
        let Some(entry) = self.entries.pop_front() else {
            return Settled::Empty;
        };
        match entry.responder {
            Some(tx) => {
                // The caller may have dropped its future; the slot is consumed either way.
                let _ = tx.send(outcome);
                Settled::Delivered { id: entry.id }
            }
            None => Settled::Stale { id: entry.id },
        }
    }

    /// Earliest deadline among unsettled slots.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter(|e| e.responder.is_some())
            .filter_map(|e| e.deadline)
            .min()
    }

    /// Reject every unsettled slot whose deadline has passed, leaving a
    /// tombstone in its place.  Returns how many were rejected.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for entry in self.entries.iter_mut() {
            let due = entry.deadline.is_some_and(|d| d <= now);
            if !due {
                continue;
            }
            if let Some(tx) = entry.responder.take() {
                let elapsed = now.saturating_duration_since(entry.sent_at);
                tracing::debug!(id = entry.id, elapsed_ms = elapsed.as_millis() as u64, "request timed out");
                let _ = tx.send(Err(ClientError::Timeout { elapsed }));
                expired += 1;
            }
        }
        expired
    }

    /// Reject every unsettled slot and clear the queue (tombstones included).
    pub fn reject_all(&mut self, err: &ClientError) -> usize {
        let mut rejected = 0;
        for entry in self.entries.drain(..) {
            if let Some(tx) = entry.responder {
                let _ = tx.send(Err(err.clone()));
                rejected += 1;
            }
        }
        rejected
    }

    /// Slots still owed a reply, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Slots whose caller is still waiting.
    pub fn live(&self) -> usize {
        self.entries.iter().filter(|e| e.responder.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportError;

    fn slot(ledger: &mut Ledger<u32>, timeout_ms: u64, now: Instant) -> oneshot::Receiver<Result<u32, ClientError>> {
        let (tx, rx) = oneshot::channel();
        ledger.push(tx, Duration::from_millis(timeout_ms), now);
        rx
    }

    #[test]
    fn replies_resolve_in_send_order() {
        let now = Instant::now();
        let mut ledger = Ledger::new();
        let mut a = slot(&mut ledger, 0, now);
        let mut b = slot(&mut ledger, 0, now);

        assert_eq!(ledger.settle_head(Ok(1)), Settled::Delivered { id: 1 });
        assert_eq!(ledger.settle_head(Ok(2)), Settled::Delivered { id: 2 });
        assert_eq!(a.try_recv().unwrap(), Ok(1));
        assert_eq!(b.try_recv().unwrap(), Ok(2));
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn reply_with_nothing_in_flight_is_ignored() {
        let mut ledger: Ledger<u32> = Ledger::new();
        assert_eq!(ledger.settle_head(Ok(7)), Settled::Empty);
    }

    #[test]
    fn timed_out_slot_absorbs_its_late_reply() {
        let now = Instant::now();
        let mut ledger = Ledger::new();
        let mut first = slot(&mut ledger, 50, now);
        let mut second = slot(&mut ledger, 0, now);

        assert_eq!(ledger.next_deadline(), Some(now + Duration::from_millis(50)));
        assert_eq!(ledger.expire(now + Duration::from_millis(60)), 1);
        match first.try_recv().unwrap() {
            Err(ClientError::Timeout { elapsed }) => {
                assert_eq!(elapsed, Duration::from_millis(60))
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.live(), 1);
        assert_eq!(ledger.next_deadline(), None);

        // The late reply for the first request must not reach the second.
        assert_eq!(ledger.settle_head(Ok(1)), Settled::Stale { id: 1 });
        assert!(second.try_recv().is_err());
        assert_eq!(ledger.settle_head(Ok(2)), Settled::Delivered { id: 2 });
        assert_eq!(second.try_recv().unwrap(), Ok(2));
    }

    #[test]
    fn expire_is_settle_once() {
        let now = Instant::now();
        let mut ledger = Ledger::new();
        let _rx = slot(&mut ledger, 10, now);
        assert_eq!(ledger.expire(now + Duration::from_millis(20)), 1);
        assert_eq!(ledger.expire(now + Duration::from_millis(40)), 0);
    }

    #[test]
    fn expire_leaves_undue_slots() {
        let now = Instant::now();
        let mut ledger = Ledger::new();
        let _a = slot(&mut ledger, 100, now);
        let _b = slot(&mut ledger, 10, now);
        assert_eq!(ledger.expire(now + Duration::from_millis(50)), 1);
        assert_eq!(ledger.live(), 1);
        assert_eq!(ledger.next_deadline(), Some(now + Duration::from_millis(100)));
    }

    #[test]
    fn reject_all_clears_queue() {
        let now = Instant::now();
        let mut ledger = Ledger::new();
        let mut a = slot(&mut ledger, 10, now);
        let mut b = slot(&mut ledger, 0, now);
        ledger.expire(now + Duration::from_millis(10));
        let _ = a.try_recv();

        let err = ClientError::Transport(TransportError::Closed("gone".into()));
        assert_eq!(ledger.reject_all(&err), 1);
        assert_eq!(ledger.len(), 0);
        assert_eq!(b.try_recv().unwrap(), Err(err));
    }

    #[test]
    fn dropped_caller_still_consumes_slot() {
        let now = Instant::now();
        let mut ledger = Ledger::new();
        drop(slot(&mut ledger, 0, now));
        let mut next = slot(&mut ledger, 0, now);
        assert_eq!(ledger.settle_head(Ok(1)), Settled::Delivered { id: 1 });
        assert_eq!(ledger.settle_head(Ok(2)), Settled::Delivered { id: 2 });
        assert_eq!(next.try_recv().unwrap(), Ok(2));
    }
}
