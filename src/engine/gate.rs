//! The Connection Admission Gate
//!
//! A single-slot mailbox moving an accepted connection from the acceptor to
//! exactly one idle reader worker.
//!
//! ```text
//!  acceptor                    slot (capacity 1)              reader pool
//!  ────────                    ─────────────────              ───────────
//!  admit(conn) ──send──> [ conn + claimed-tx ] ──recv──> claim() ─┐
//!      │                                                          │
//!      └──────── waits on claimed-rx <──────── claimed-tx.send() <┘
//! ```
//!
//! The slot carries the connection itself, so there is no shared variable
//! to read before it is written or overwrite before it is claimed. `admit`
//! returns only once a reader has taken the connection: when every reader
//! is busy the acceptor waits instead of dropping anything.

use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// The gate was closed for shutdown.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("admission gate closed")]
pub struct GateClosed;

struct Handoff<C> {
    connection: C,
    claimed: oneshot::Sender<()>,
}

/// Single-slot handoff of connections to reader workers.
pub struct AdmissionGate<C> {
    slot_tx: Mutex<Option<mpsc::Sender<Handoff<C>>>>,
    slot_rx: tokio::sync::Mutex<mpsc::Receiver<Handoff<C>>>,
}

impl<C: Send> AdmissionGate<C> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            slot_tx: Mutex::new(Some(tx)),
            slot_rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Publishes `connection` and waits until a reader has claimed it.
    pub async fn admit(&self, connection: C) -> Result<(), GateClosed> {
        let slot = self
            .slot_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(GateClosed)?;

        let (claimed, ack) = oneshot::channel();
        slot.send(Handoff { connection, claimed })
            .await
            .map_err(|_| GateClosed)?;

        ack.await.map_err(|_| GateClosed)?;
        trace!("Connection handed to a reader");
        Ok(())
    }

    /// Takes the next admitted connection, waiting until one is published.
    ///
    /// Returns `None` once the gate is closed.
    pub async fn claim(&self) -> Option<C> {
        let handoff = {
            let mut slot = self.slot_rx.lock().await;
            slot.recv().await?
        };

        // The acceptor may have given up waiting; the connection is ours anyway.
        let _ = handoff.claimed.send(());
        Some(handoff.connection)
    }

    /// Stops admitting. Idle readers return `None` from [`claim`](Self::claim)
    /// once the slot is empty.
    pub fn close(&self) {
        self.slot_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl<C: Send> Default for AdmissionGate<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

    #[test]
    fn test_admit_waits_for_claim() {
        let gate = AdmissionGate::new();

        let mut admit = task::spawn(gate.admit(7));
        // The slot takes the connection, but nobody has claimed it yet.
        assert_pending!(admit.poll());

        let mut claim = task::spawn(gate.claim());
        assert_eq!(assert_ready!(claim.poll()), Some(7));

        assert!(admit.is_woken());
        assert_ready_ok!(admit.poll());
    }

    #[test]
    fn test_claim_waits_for_admit() {
        let gate = AdmissionGate::new();

        let mut claim = task::spawn(gate.claim());
        assert_pending!(claim.poll());

        let mut admit = task::spawn(gate.admit("conn"));
        assert_pending!(admit.poll());

        assert!(claim.is_woken());
        assert_eq!(assert_ready!(claim.poll()), Some("conn"));
        assert_ready_ok!(admit.poll());
    }

    #[test]
    fn test_closed_gate() {
        let gate: AdmissionGate<u32> = AdmissionGate::new();
        gate.close();

        assert_eq!(assert_ready!(task::spawn(gate.admit(1)).poll()), Err(GateClosed));
        assert_eq!(assert_ready!(task::spawn(gate.claim()).poll()), None);
    }

    #[tokio::test]
    async fn test_each_connection_claimed_once() {
        let gate = Arc::new(AdmissionGate::new());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                while let Some(conn) = gate.claim().await {
                    seen_tx.send(conn).unwrap();
                }
            });
        }
        drop(seen_tx);

        for conn in 0..20u32 {
            gate.admit(conn).await.unwrap();
        }

        let mut seen = vec![];
        for _ in 0..20 {
            seen.push(seen_rx.recv().await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }
}
