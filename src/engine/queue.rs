//! The Command Queue
//!
//! A bounded FIFO between the reader workers (producers) and the executor
//! workers (consumers).
//!
//! ```text
//!                   free slots                     filled slots
//!                  (Semaphore)                     (Semaphore)
//!  reader ──enqueue──> │ ┌───┬───┬───┬───┬───┐ │ ──dequeue──> executor
//!  reader ──enqueue──> │ │ c │ c │ c │   │   │ │ ──dequeue──> executor
//!                        └───┴───┴───┴───┴───┘
//!                        Mutex<VecDeque<Command>>
//! ```
//!
//! `enqueue` waits for a free slot, `dequeue` waits for a filled one. Both
//! semaphores are fair, so waiting producers are admitted in arrival order.
//! Each dequeued command carries a ticket number assigned under the same
//! lock that pops it, which lets the executors keep FIFO order past the
//! point where they run concurrently.

use crate::protocol::Command;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::trace;

/// Default number of commands the queue holds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// The queue was closed for shutdown.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("command queue closed")]
pub struct QueueClosed;

/// A dequeued command and its position in the global FIFO order.
#[derive(Debug)]
pub struct Ticket {
    pub seq: u64,
    pub command: Command,
}

#[derive(Debug, Default)]
struct Slots {
    items: VecDeque<Command>,
    next_seq: u64,
}

/// Bounded multi-producer, multi-consumer FIFO of commands.
#[derive(Debug)]
pub struct CommandQueue {
    slots: Mutex<Slots>,
    free: Semaphore,
    filled: Semaphore,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
        }
    }

    /// Appends a command, waiting while the queue is full.
    pub async fn enqueue(&self, command: Command) -> Result<(), QueueClosed> {
        let permit = self.free.acquire().await.map_err(|_| QueueClosed)?;
        permit.forget();

        {
            let mut slots = self.slots();
            slots.items.push_back(command);
            trace!(queued = slots.items.len(), "Command enqueued");
        }

        self.filled.add_permits(1);
        Ok(())
    }

    /// Removes the oldest command, waiting while the queue is empty.
    pub async fn dequeue(&self) -> Result<Ticket, QueueClosed> {
        let permit = self.filled.acquire().await.map_err(|_| QueueClosed)?;
        permit.forget();

        let ticket = {
            let mut slots = self.slots();
            // Filled permits track queued items one for one.
            let command = slots.items.pop_front().ok_or(QueueClosed)?;
            let seq = slots.next_seq;
            slots.next_seq += 1;
            Ticket { seq, command }
        };

        self.free.add_permits(1);
        Ok(ticket)
    }

    /// Wakes every waiting producer and consumer with [`QueueClosed`].
    pub fn close(&self) {
        self.free.close();
        self.filled.close();
    }

    /// Number of commands currently queued.
    pub fn len(&self) -> usize {
        self.slots().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
