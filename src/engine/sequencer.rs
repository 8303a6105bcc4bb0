//! Ticket Sequencer
//!
//! Executors dequeue in FIFO order but then run concurrently, so two
//! commands from the same connection could otherwise reach the dispatcher
//! in the wrong order. The sequencer is a turnstile: an executor holding
//! ticket `n` enters only after ticket `n - 1` has left.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Admits ticket holders one at a time, in ticket order.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: AtomicU64,
    notify: Notify,
}

/// Proof that the holder's ticket is the current one. Dropping it admits
/// the next ticket.
#[derive(Debug)]
pub struct Turn<'a> {
    sequencer: &'a Sequencer,
    seq: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `seq` is the current ticket.
    pub async fn enter(&self, seq: u64) -> Turn<'_> {
        loop {
            // Registered before the check so a concurrent `leave` cannot be missed.
            let notified = self.notify.notified();
            if self.next.load(Ordering::Acquire) == seq {
                return Turn {
                    sequencer: self,
                    seq,
                };
            }
            notified.await;
        }
    }

    /// The ticket currently allowed in.
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}

impl Turn<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.sequencer.next.store(self.seq + 1, Ordering::Release);
        self.sequencer.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_tickets_enter_in_order() {
        let sequencer = Sequencer::new();

        let mut second = task::spawn(sequencer.enter(1));
        assert_pending!(second.poll());

        let first = assert_ready!(task::spawn(sequencer.enter(0)).poll());
        assert_eq!(first.seq(), 0);
        assert_pending!(second.poll());

        drop(first);
        assert!(second.is_woken());
        let turn = assert_ready!(second.poll());
        assert_eq!(turn.seq(), 1);
        drop(turn);
        assert_eq!(sequencer.current(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_arrivals_are_serialized() {
        let sequencer = Arc::new(Sequencer::new());
        let order = Arc::new(Mutex::new(vec![]));

        let mut handles = vec![];
        for seq in (0..16).rev() {
            let sequencer = Arc::clone(&sequencer);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _turn = sequencer.enter(seq).await;
                order.lock().unwrap().push(seq);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }
}
