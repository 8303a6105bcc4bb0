//! Command-Processing Engine
//!
//! The concurrent core of the server.
//!
//! ```text
//!  acceptor ──> AdmissionGate ──> reader pool ──> CommandQueue ──> executor pool
//!                                     │                                 │
//!                                     │ LOGIN / implicit UNREGISTER     │ Sequencer
//!                                     ▼                                 ▼
//!                                 Dispatcher ◄──────────────────── Dispatcher
//!                                     │                                 │
//!                                     └───────────> Registry <──────────┘
//! ```
//!
//! - `queue`: bounded FIFO of commands with blocking enqueue / dequeue
//! - `gate`: single-slot handoff of accepted connections to readers
//! - `sequencer`: keeps dispatch in dequeue order across executors
//! - `executor`: the executor loop, parse-error answers and delivery

pub mod executor;
pub mod gate;
pub mod queue;
pub mod sequencer;

pub use executor::{deliver, execute, spawn_executors};
pub use gate::{AdmissionGate, GateClosed};
pub use queue::{CommandQueue, QueueClosed, Ticket, DEFAULT_QUEUE_CAPACITY};
pub use sequencer::{Sequencer, Turn};

use crate::commands::{CommandHandlers, Dispatcher, SocialGraph};
use crate::config::ServerConfig;
use crate::connection::ServerStats;
use crate::registry::Registry;
use std::sync::Arc;

/// State shared by every reader and executor.
pub struct Engine {
    pub queue: CommandQueue,
    pub sequencer: Sequencer,
    pub dispatcher: Dispatcher,
    pub stats: ServerStats,
    /// Largest request frame a reader accepts
    pub max_frame_size: usize,
}

impl Engine {
    /// Builds an engine backed by the default [`SocialGraph`] handlers.
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_handlers(config, Arc::new(SocialGraph::new(config.timeline_capacity)))
    }

    /// Builds an engine dispatching to custom handlers.
    pub fn with_handlers(config: &ServerConfig, handlers: Arc<dyn CommandHandlers>) -> Self {
        Self {
            queue: CommandQueue::new(config.queue_capacity),
            sequencer: Sequencer::new(),
            dispatcher: Dispatcher::new(Registry::new(config.max_clients), handlers),
            stats: ServerStats::new(),
            max_frame_size: config.max_frame_size,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }
}
