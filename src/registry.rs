//! Message Registry — correlates outgoing commands to incoming
//! responses by a 1-byte rolling message tag.
//!
//! Shaped like the reference daemon's actor `oneshot` reply pattern
//! (`actor::ActorHandle::commit`), generalized from "one in-flight
//! commit at a time" to a bounded table of concurrently outstanding
//! requests keyed by `msg`, with per-entry deadlines swept the way the
//! reference daemon's `DeviceIo::request` retires a read attempt after
//! its time budget expires.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::ToyPadError;

/// Default per-request timeout: 800ms.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(800);

/// Distinguishes how a pending request's payload should be validated
/// once it's delivered — the registry itself is agnostic to this, it
/// only exists so a caller can tag its own waiter for bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Generic,
    ReadPages,
}

struct PendingEntry {
    #[allow(dead_code)]
    kind: RequestKind,
    deadline: Instant,
    waiter: oneshot::Sender<Result<Vec<u8>, ToyPadError>>,
}

/// Holds at most one pending request per `msg` byte and a rolling
/// counter for allocating new ones.
pub struct MessageRegistry {
    counter: u8,
    pending: HashMap<u8, PendingEntry>,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self {
            counter: 0x01,
            pending: HashMap::new(),
        }
    }

    /// Reset to a fresh session: clears all pending entries (failing
    /// them with `NotConnected`) and restarts the counter at `0x01`.
    pub fn reset(&mut self) {
        self.drain_with(ToyPadError::NotConnected);
        self.counter = 0x01;
    }

    /// Allocate a new `msg` tag and register a pending entry for it.
    ///
    /// If an entry already exists under the allocated tag (the counter
    /// wrapped around a still-outstanding request), the old entry is
    /// pre-empted with `Timeout` before the new one replaces it.
    pub fn allocate(
        &mut self,
        kind: RequestKind,
        timeout: Duration,
    ) -> (u8, oneshot::Receiver<Result<Vec<u8>, ToyPadError>>) {
        let msg = self.counter;
        self.counter = self.counter.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        if let Some(old) = self.pending.insert(
            msg,
            PendingEntry {
                kind,
                deadline,
                waiter: tx,
            },
        ) {
            warn!("msg {msg:#04x} collided with a still-outstanding request; pre-empting it");
            let _ = old.waiter.send(Err(ToyPadError::Timeout));
        }

        (msg, rx)
    }

    /// Deliver a response payload to its waiter. Drops silently if no
    /// pending entry exists for `msg` (a stray ack, or a response that
    /// arrived after the request already timed out).
    pub fn resolve(&mut self, msg: u8, payload: Vec<u8>) {
        match self.pending.remove(&msg) {
            Some(entry) => {
                let _ = entry.waiter.send(Ok(payload));
            }
            None => trace!("dropping response for unregistered msg {msg:#04x}"),
        }
    }

    /// Remove the pending entry for `msg` without resolving it —
    /// used when a caller cancels its own wait.
    pub fn cancel(&mut self, msg: u8) {
        self.pending.remove(&msg);
    }

    /// Fail and remove every pending entry whose deadline has passed.
    /// Called on a timer and after every inbound frame.
    pub fn sweep(&mut self, now: Instant) {
        let expired: Vec<u8> = self
            .pending
            .iter()
            .filter(|(_, e)| e.deadline < now)
            .map(|(&msg, _)| msg)
            .collect();

        for msg in expired {
            if let Some(entry) = self.pending.remove(&msg) {
                debug!("msg {msg:#04x} timed out");
                let _ = entry.waiter.send(Err(ToyPadError::Timeout));
            }
        }
    }

    /// Fail and remove every pending entry with the given error —
    /// used on session detach.
    pub fn drain_with(&mut self, err: ToyPadError) {
        for (_, entry) in self.pending.drain() {
            let _ = entry.waiter.send(Err(err.clone()));
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_and_resolve_roundtrip() {
        let mut reg = MessageRegistry::new();
        let (msg, rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
        reg.resolve(msg, vec![0xAA, 0xBB]);
        assert_eq!(rx.await.unwrap().unwrap(), vec![0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn resolve_for_unregistered_msg_is_silently_dropped() {
        let mut reg = MessageRegistry::new();
        // No allocate() call first.
        reg.resolve(0x42, vec![0x01]);
        assert_eq!(reg.pending_count(), 0);
    }

    #[tokio::test]
    async fn counter_wraps_and_preempts_collisions() {
        let mut reg = MessageRegistry::new();
        reg.counter = 0xFF;
        let (first_msg, first_rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
        assert_eq!(first_msg, 0xFF);
        let (second_msg, _second_rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
        assert_eq!(second_msg, 0x00);

        // Collide with `first_msg` by forcing the counter back to it.
        reg.counter = first_msg;
        let (collided_msg, _rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
        assert_eq!(collided_msg, first_msg);

        // The original waiter for `first_msg` must have been pre-empted.
        assert_eq!(first_rx.await.unwrap(), Err(ToyPadError::Timeout));
    }

    #[tokio::test]
    async fn sweep_fails_expired_entries_only() {
        let mut reg = MessageRegistry::new();
        let (msg_a, rx_a) = reg.allocate(RequestKind::Generic, Duration::from_millis(0));
        let (msg_b, _rx_b) = reg.allocate(RequestKind::Generic, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(5)).await;
        reg.sweep(Instant::now());

        assert_eq!(rx_a.await.unwrap(), Err(ToyPadError::Timeout));
        assert_eq!(reg.pending_count(), 1);
        assert!(reg.pending.contains_key(&msg_b));
        let _ = msg_a;
    }

    /// Property 7 — timeout isolation: a timed-out slot, when later
    /// "resolved" by a stray late response, must not resolve any other
    /// caller and must not panic.
    #[tokio::test]
    async fn timeout_isolation() {
        let mut reg = MessageRegistry::new();
        let (msg, rx) = reg.allocate(RequestKind::ReadPages, Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        reg.sweep(Instant::now());
        assert_eq!(rx.await.unwrap(), Err(ToyPadError::Timeout));

        // A late response bearing the now-freed msg must be dropped,
        // not delivered anywhere (there is no live waiter to deliver to).
        reg.resolve(msg, vec![0xFF]);
        assert_eq!(reg.pending_count(), 0);
    }

    /// Property 4 — N concurrent in-flight requests with distinct
    /// `msg`, resolved in arbitrary order, each resolve exactly once to
    /// the matching waiter.
    #[tokio::test]
    async fn concurrent_requests_resolve_to_matching_waiters() {
        let mut reg = MessageRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..10 {
            let (msg, rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
            receivers.push((msg, rx));
        }

        // Resolve in reverse order with payloads tagged by msg.
        for &(msg, _) in receivers.iter().rev() {
            reg.resolve(msg, vec![msg]);
        }

        for (msg, rx) in receivers {
            assert_eq!(rx.await.unwrap().unwrap(), vec![msg]);
        }
    }

    #[tokio::test]
    async fn cancel_deregisters_without_resolving() {
        let mut reg = MessageRegistry::new();
        let (msg, rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
        reg.cancel(msg);
        assert_eq!(reg.pending_count(), 0);
        // Late response for the cancelled msg is dropped.
        reg.resolve(msg, vec![0x00]);
        drop(rx); // receiver dropped without ever being resolved; no panic.
    }

    /// Property 8 — disconnect drains exactly K outstanding requests.
    #[tokio::test]
    async fn reset_drains_all_pending_with_not_connected() {
        let mut reg = MessageRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (_, rx) = reg.allocate(RequestKind::Generic, DEFAULT_TIMEOUT);
            receivers.push(rx);
        }

        reg.reset();
        assert_eq!(reg.pending_count(), 0);
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(ToyPadError::NotConnected));
        }
    }
}
