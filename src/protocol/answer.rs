//! Server Answers
//!
//! An [`Answer`] is one reply destined for a single client connection.
//!
//! ## Wire Format
//!
//! The payload of an answer frame is UTF-8 text:
//!
//! ```text
//! <code> <KIND>[ <text>]
//! [<author> <message>]        one line per timeline entry
//! ```
//!
//! Examples: `0 LOGIN alice`, `0 FOLLOW_COUNT 3`, `4 FOLLOW unknown client bob`,
//! `0 TIMELINE 2\nbob hi\nalice hello`.

use crate::connection::ConnectionHandle;
use crate::protocol::command::{CommandKind, ParseError};
use crate::registry::{ClientKey, TimelineEntry};
use bytes::Bytes;
use std::fmt;

/// Status carried by every answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    ParseError,
    DuplicateKey,
    RegistryFull,
    UnknownTarget,
    NotLoggedIn,
    HandlerFailure,
}

impl StatusCode {
    /// Numeric code sent on the wire.
    pub fn code(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::ParseError => 1,
            StatusCode::DuplicateKey => 2,
            StatusCode::RegistryFull => 3,
            StatusCode::UnknownTarget => 4,
            StatusCode::NotLoggedIn => 5,
            StatusCode::HandlerFailure => 6,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Kind-specific answer payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerBody {
    Empty,
    Text(String),
    Count(usize),
    /// Most recent entry first
    Timeline(Vec<TimelineEntry>),
}

/// One reply destined for a single connection.
#[derive(Debug)]
pub struct Answer {
    /// Session whose connection receives the answer
    pub destination: ClientKey,
    /// Kind of the command being answered
    pub kind: CommandKind,
    pub status: StatusCode,
    pub body: AnswerBody,
    /// Connection to use when the destination is no longer registered
    /// (the farewell of an UNREGISTER)
    pub route: Option<ConnectionHandle>,
}

impl Answer {
    /// A successful answer.
    pub fn ok(destination: ClientKey, kind: CommandKind, body: AnswerBody) -> Self {
        Self {
            destination,
            kind,
            status: StatusCode::Ok,
            body,
            route: None,
        }
    }

    /// A failure answer with a human-readable reason.
    pub fn failure(
        destination: ClientKey,
        kind: CommandKind,
        status: StatusCode,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            destination,
            kind,
            status,
            body: AnswerBody::Text(reason.into()),
            route: None,
        }
    }

    /// The diagnostic answer for a request that failed to parse.
    pub fn parse_error(destination: ClientKey, err: &ParseError) -> Self {
        Self::failure(
            destination,
            CommandKind::ParseError,
            StatusCode::ParseError,
            err.to_string(),
        )
    }

    /// Routes the answer through `connection` instead of a registry lookup.
    pub fn with_route(mut self, connection: ConnectionHandle) -> Self {
        self.route = Some(connection);
        self
    }

    /// Encodes the answer as a frame payload.
    pub fn encode(&self) -> Bytes {
        let mut out = format!("{} {}", self.status, self.kind);
        match &self.body {
            AnswerBody::Empty => {}
            AnswerBody::Text(text) => {
                out.push(' ');
                out.push_str(text);
            }
            AnswerBody::Count(n) => {
                out.push(' ');
                out.push_str(&n.to_string());
            }
            AnswerBody::Timeline(entries) => {
                out.push(' ');
                out.push_str(&entries.len().to_string());
                for entry in entries {
                    out.push('\n');
                    out.push_str(&entry.author);
                    out.push(' ');
                    out.push_str(&entry.message);
                }
            }
        }
        Bytes::from(out)
    }
}
