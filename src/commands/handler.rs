//! Command Handlers
//!
//! The business-logic side of the server: one entry point per command kind,
//! each taking the command and the registry and producing an [`Answer`] or a
//! [`HandlerError`].
//!
//! [`CommandHandlers`] is the contract the dispatcher calls through.
//! [`SocialGraph`] is the implementation the server ships with.
//!
//! ## Supported Commands
//!
//! - `LOGIN name` - Register the connection under `name`
//! - `PUBLISH message` - Push a message to own and followers' timelines
//! - `FOLLOW name` - Follow another client
//! - `TIMELINE` - The most recent timeline entries
//! - `FOLLOW_COUNT` - Number of followers
//! - `RDV [name]` - Rendezvous, or check that `name` is registered
//! - `UNREGISTER` - Leave the server
//!
//! Handlers run inside the dispatcher's critical section, one at a time.
//! They never perform I/O.

use crate::connection::ConnectionHandle;
use crate::protocol::{Answer, AnswerBody, Command, CommandKind, StatusCode};
use crate::registry::{ClientKey, ClientSession, Registry, RegistryError, TimelineEntry};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors a handler can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unknown client {0}")]
    UnknownTarget(String),

    #[error("cannot follow yourself")]
    SelfFollow,

    #[error("already logged in as {0}")]
    AlreadyLoggedIn(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("{0} cannot be dispatched")]
    NotDispatchable(CommandKind),
}

impl HandlerError {
    /// The status code reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Registry(RegistryError::DuplicateKey(_)) => StatusCode::DuplicateKey,
            HandlerError::Registry(RegistryError::Full { .. }) => StatusCode::RegistryFull,
            HandlerError::Registry(RegistryError::NotFound(_)) | HandlerError::NotLoggedIn => {
                StatusCode::NotLoggedIn
            }
            HandlerError::UnknownTarget(_) => StatusCode::UnknownTarget,
            HandlerError::SelfFollow
            | HandlerError::AlreadyLoggedIn(_)
            | HandlerError::NotDispatchable(_) => StatusCode::HandlerFailure,
        }
    }
}

pub type HandlerResult = Result<Answer, HandlerError>;

/// One entry point per command kind.
///
/// LOGIN additionally receives the connection the new session will own.
pub trait CommandHandlers: Send + Sync {
    fn login(&self, command: &Command, connection: ConnectionHandle, registry: &Registry) -> HandlerResult;
    fn publish(&self, command: &Command, registry: &Registry) -> HandlerResult;
    fn follow(&self, command: &Command, registry: &Registry) -> HandlerResult;
    fn timeline(&self, command: &Command, registry: &Registry) -> HandlerResult;
    fn follow_count(&self, command: &Command, registry: &Registry) -> HandlerResult;
    fn rdv(&self, command: &Command, registry: &Registry) -> HandlerResult;
    fn unregister(&self, command: &Command, registry: &Registry) -> HandlerResult;
}

/// The default social-graph implementation.
#[derive(Debug, Clone)]
pub struct SocialGraph {
    timeline_capacity: usize,
}

impl SocialGraph {
    pub fn new(timeline_capacity: usize) -> Self {
        Self { timeline_capacity }
    }

    /// Resolves the session that issued `command`.
    ///
    /// A command bound to a connection only resolves to a session owned by
    /// that same connection: once its client is gone and the name is taken
    /// again, leftover commands are refused instead of acting for the
    /// newcomer.
    fn origin(command: &Command, registry: &Registry) -> Result<Arc<ClientSession>, HandlerError> {
        let key = command.origin.ok_or(HandlerError::NotLoggedIn)?;
        let session = registry.lookup(key).map_err(|_| HandlerError::NotLoggedIn)?;

        match &command.connection {
            Some(connection) if !session.connection().same_connection(connection) => {
                Err(HandlerError::NotLoggedIn)
            }
            _ => Ok(session),
        }
    }
}

impl Default for SocialGraph {
    fn default() -> Self {
        Self::new(crate::registry::DEFAULT_TIMELINE_CAPACITY)
    }
}

impl CommandHandlers for SocialGraph {
    fn login(&self, command: &Command, connection: ConnectionHandle, registry: &Registry) -> HandlerResult {
        if command.origin.is_some() {
            let current = Self::origin(command, registry)?;
            return Err(HandlerError::AlreadyLoggedIn(current.name().to_string()));
        }

        let session = ClientSession::new(command.payload.as_str(), connection, self.timeline_capacity);
        let session = registry.insert(session)?;
        debug!(key = %session.key(), "{} logged in", session.name());

        Ok(Answer::ok(
            session.key(),
            CommandKind::Login,
            AnswerBody::Text(session.name().to_string()),
        ))
    }

    fn publish(&self, command: &Command, registry: &Registry) -> HandlerResult {
        let author = Self::origin(command, registry)?;
        let entry = TimelineEntry::new(author.name(), command.payload.as_str());

        author.push_timeline(entry.clone());

        let mut reached = 0;
        for follower in author.followers() {
            // A follower may have left between its FOLLOW and this PUBLISH.
            if let Ok(session) = registry.lookup(follower) {
                session.push_timeline(entry.clone());
                reached += 1;
            }
        }

        Ok(Answer::ok(author.key(), CommandKind::Publish, AnswerBody::Count(reached)))
    }

    fn follow(&self, command: &Command, registry: &Registry) -> HandlerResult {
        let me = Self::origin(command, registry)?;
        let target_key = ClientKey::from_name(&command.payload);

        if target_key == me.key() {
            return Err(HandlerError::SelfFollow);
        }

        let target = registry
            .lookup(target_key)
            .map_err(|_| HandlerError::UnknownTarget(command.payload.clone()))?;

        target.add_follower(me.key());
        me.add_following(target.key());

        Ok(Answer::ok(
            me.key(),
            CommandKind::Follow,
            AnswerBody::Text(target.name().to_string()),
        ))
    }

    fn timeline(&self, command: &Command, registry: &Registry) -> HandlerResult {
        let me = Self::origin(command, registry)?;
        Ok(Answer::ok(
            me.key(),
            CommandKind::Timeline,
            AnswerBody::Timeline(me.timeline()),
        ))
    }

    fn follow_count(&self, command: &Command, registry: &Registry) -> HandlerResult {
        let me = Self::origin(command, registry)?;
        Ok(Answer::ok(
            me.key(),
            CommandKind::FollowCount,
            AnswerBody::Count(me.follower_count()),
        ))
    }

    fn rdv(&self, command: &Command, registry: &Registry) -> HandlerResult {
        let me = Self::origin(command, registry)?;

        if command.payload.is_empty() {
            return Ok(Answer::ok(me.key(), CommandKind::Rdv, AnswerBody::Empty));
        }

        let target = registry
            .lookup(ClientKey::from_name(&command.payload))
            .map_err(|_| HandlerError::UnknownTarget(command.payload.clone()))?;

        Ok(Answer::ok(
            me.key(),
            CommandKind::Rdv,
            AnswerBody::Text(target.name().to_string()),
        ))
    }

    fn unregister(&self, command: &Command, registry: &Registry) -> HandlerResult {
        let key = Self::origin(command, registry)?.key();
        let session = registry.remove(key)?;

        for followed in session.following() {
            if let Ok(other) = registry.lookup(followed) {
                other.remove_follower(key);
            }
        }
        for follower in session.followers() {
            if let Ok(other) = registry.lookup(follower) {
                other.remove_following(key);
            }
        }

        debug!(key = %key, "{} unregistered", session.name());

        Ok(Answer::ok(
            key,
            CommandKind::Unregister,
            AnswerBody::Text(session.name().to_string()),
        )
        .with_route(session.connection().clone()))
    }
}
