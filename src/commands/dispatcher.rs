//! Command Dispatch
//!
//! Maps a command kind to its handler and normalizes error reporting.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │                                                             │
//! │   lock ──> match kind ──> CommandHandlers::<kind>() ──┐     │
//! │                                                       │     │
//! │   Ok(answer)  ───────────────────────────────────────>│     │
//! │   Err(e) ──> warn! ──> failure answer (if expected) ─>│     │
//! │                                                       ▼     │
//! │                                               Option<Answer>│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every handler invocation runs under one critical section, so exactly one
//! session-mutating command executes at a time across the whole server.
//! Handlers must not block while holding it.

use crate::commands::handler::{CommandHandlers, HandlerError, HandlerResult};
use crate::connection::ConnectionHandle;
use crate::protocol::{Answer, Command, CommandKind};
use crate::registry::{ClientKey, Registry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// Routes commands to the business-logic handlers.
pub struct Dispatcher {
    registry: Registry,
    handlers: Arc<dyn CommandHandlers>,
    lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(registry: Registry, handlers: Arc<dyn CommandHandlers>) -> Self {
        Self {
            registry,
            handlers,
            lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs LOGIN for a freshly admitted connection.
    ///
    /// The returned answer's status tells the caller whether a session now
    /// exists; on success its destination is the new session key.
    pub fn login(&self, command: &Command, connection: ConnectionHandle) -> Answer {
        let result = {
            let _guard = self.enter();
            self.handlers.login(command, connection, &self.registry)
        };

        result.unwrap_or_else(|err| {
            warn!(client = %command.payload, error = %err, "LOGIN rejected");
            failure_answer(command, &err)
        })
    }

    /// Executes a parsed command.
    ///
    /// Returns the answer to deliver, or `None` when the protocol owes the
    /// client nothing.
    pub fn dispatch(&self, command: Command) -> Option<Answer> {
        trace!(kind = %command.kind, origin = ?command.origin, "Dispatching");

        let result = {
            let _guard = self.enter();
            self.invoke(&command)
        };

        match result {
            Ok(answer) => command.answer_expected.then_some(answer),
            Err(err) => {
                warn!(
                    kind = %command.kind,
                    origin = ?command.origin,
                    error = %err,
                    "Failed to run command: {}",
                    command.raw
                );
                command
                    .answer_expected
                    .then(|| failure_answer(&command, &err))
            }
        }
    }

    fn invoke(&self, command: &Command) -> HandlerResult {
        let registry = &self.registry;
        match command.kind {
            CommandKind::Publish => self.handlers.publish(command, registry),
            CommandKind::Follow => self.handlers.follow(command, registry),
            CommandKind::Timeline => self.handlers.timeline(command, registry),
            CommandKind::FollowCount => self.handlers.follow_count(command, registry),
            CommandKind::Rdv => self.handlers.rdv(command, registry),
            CommandKind::Unregister => self.handlers.unregister(command, registry),
            // LOGIN on an active connection: the handler reports it.
            CommandKind::Login => match &command.connection {
                Some(connection) => self.handlers.login(command, connection.clone(), registry),
                None => Err(HandlerError::NotDispatchable(CommandKind::Login)),
            },
            CommandKind::ParseError => Err(HandlerError::NotDispatchable(CommandKind::ParseError)),
        }
    }

    fn enter(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds the error answer for a failed command.
fn failure_answer(command: &Command, err: &HandlerError) -> Answer {
    let destination = command
        .origin
        .unwrap_or_else(|| ClientKey::from_name(&command.payload));
    Answer::failure(destination, command.kind, err.status(), err.to_string())
}
