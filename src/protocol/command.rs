//! Request Parsing and Validation
//!
//! Turns one raw request line into a [`Command`].
//!
//! ## Request Format
//!
//! ```text
//! <KEYWORD> [<argument>]
//!
//! LOGIN alice            name argument, at most 16 bytes, one word
//! PUBLISH hello world    message argument, at most 64 bytes
//! FOLLOW bob
//! TIMELINE               no argument
//! FOLLOW_COUNT           no argument
//! RDV [bob]              optional name
//! UNREGISTER             no argument
//! ```
//!
//! Keywords are matched case-insensitively. Leading and trailing whitespace
//! is trimmed; spaces inside a message are kept as sent.
//!
//! Parsing never rejects a request silently: a malformed line still becomes
//! a [`Command`] of kind [`CommandKind::ParseError`] carrying the raw text and
//! the reason, so the executor stage can answer it in order.

use crate::connection::ConnectionHandle;
use crate::registry::ClientKey;
use std::fmt;
use thiserror::Error;

/// Maximum length of a client name in bytes.
pub const MAX_NAME_LEN: usize = 16;

/// Maximum length of a published message in bytes.
pub const MAX_MESSAGE_LEN: usize = 64;

/// The kind of a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Login,
    Publish,
    Follow,
    Timeline,
    FollowCount,
    Rdv,
    Unregister,
    /// Marker for a request that failed to parse
    ParseError,
}

/// What a command expects after its keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Argument {
    None,
    Name,
    OptionalName,
    Message,
}

impl CommandKind {
    /// The wire keyword for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            CommandKind::Login => "LOGIN",
            CommandKind::Publish => "PUBLISH",
            CommandKind::Follow => "FOLLOW",
            CommandKind::Timeline => "TIMELINE",
            CommandKind::FollowCount => "FOLLOW_COUNT",
            CommandKind::Rdv => "RDV",
            CommandKind::Unregister => "UNREGISTER",
            CommandKind::ParseError => "PARSE_ERROR",
        }
    }

    /// Maps a request keyword to its kind. `PARSE_ERROR` is not a request.
    pub fn from_keyword(word: &str) -> Option<Self> {
        [
            CommandKind::Login,
            CommandKind::Publish,
            CommandKind::Follow,
            CommandKind::Timeline,
            CommandKind::FollowCount,
            CommandKind::Rdv,
            CommandKind::Unregister,
        ]
        .into_iter()
        .find(|kind| kind.keyword().eq_ignore_ascii_case(word))
    }

    fn argument(self) -> Argument {
        match self {
            CommandKind::Login | CommandKind::Follow => Argument::Name,
            CommandKind::Publish => Argument::Message,
            CommandKind::Rdv => Argument::OptionalName,
            CommandKind::Timeline
            | CommandKind::FollowCount
            | CommandKind::Unregister
            | CommandKind::ParseError => Argument::None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Reasons a request line is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty request")]
    Empty,

    #[error("request is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{0} requires an argument")]
    MissingArgument(CommandKind),

    #[error("{0} takes no argument")]
    UnexpectedArgument(CommandKind),

    #[error("invalid name '{0}': names are a single word")]
    InvalidName(String),

    #[error("name too long: {len} bytes (max: {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("message too long: {len} bytes (max: {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("message contains control characters")]
    InvalidMessage,
}

/// Outcome of parsing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    Parsed,
    Failed(ParseError),
}

/// One parsed client request.
///
/// A command is owned by exactly one pipeline stage at a time: the reader
/// that parsed it, then the queue, then the executor that dequeued it.
#[derive(Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Key of the issuing session; `None` before login
    pub origin: Option<ClientKey>,
    /// Name for LOGIN / FOLLOW / RDV, message text for PUBLISH, else empty
    pub payload: String,
    /// Whether the protocol owes the client a reply
    pub answer_expected: bool,
    /// The request as received, for diagnostics
    pub raw: String,
    pub status: ParseStatus,
    /// Connection the request arrived on, once bound by its reader
    pub connection: Option<ConnectionHandle>,
}

impl Command {
    /// Parses a raw request frame issued by `origin`.
    pub fn parse(frame: &[u8], origin: Option<ClientKey>) -> Self {
        match std::str::from_utf8(frame) {
            Ok(line) => Self::parse_line(line, origin),
            Err(_) => Self::failed(
                String::from_utf8_lossy(frame).into_owned(),
                origin,
                ParseError::InvalidUtf8,
            ),
        }
    }

    /// Parses a request line issued by `origin`.
    pub fn parse_line(line: &str, origin: Option<ClientKey>) -> Self {
        match parse_request(line) {
            Ok((kind, payload)) => Self {
                kind,
                origin,
                payload,
                answer_expected: true,
                raw: line.to_string(),
                status: ParseStatus::Parsed,
                connection: None,
            },
            Err(err) => Self::failed(line.to_string(), origin, err),
        }
    }

    /// The UNREGISTER a reader synthesizes when its connection goes away.
    /// Nobody is left to read the reply, so none is expected.
    pub fn implicit_unregister(origin: ClientKey) -> Self {
        Self {
            kind: CommandKind::Unregister,
            origin: Some(origin),
            payload: String::new(),
            answer_expected: false,
            raw: String::new(),
            status: ParseStatus::Parsed,
            connection: None,
        }
    }

    fn failed(raw: String, origin: Option<ClientKey>, err: ParseError) -> Self {
        Self {
            kind: CommandKind::ParseError,
            origin,
            payload: String::new(),
            answer_expected: true,
            raw,
            status: ParseStatus::Failed(err),
            connection: None,
        }
    }

    /// Binds the command to the connection it arrived on. Handlers then
    /// refuse it once that connection no longer owns the origin's session.
    pub fn with_connection(mut self, connection: ConnectionHandle) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn is_parsed(&self) -> bool {
        self.status == ParseStatus::Parsed
    }

    /// The parse failure, if any.
    pub fn parse_error(&self) -> Option<&ParseError> {
        match &self.status {
            ParseStatus::Parsed => None,
            ParseStatus::Failed(err) => Some(err),
        }
    }
}

/// Splits a request line into its kind and bound-checked payload.
pub fn parse_request(line: &str) -> Result<(CommandKind, String), ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let kind = CommandKind::from_keyword(word)
        .ok_or_else(|| ParseError::UnknownCommand(word.to_string()))?;

    let payload = match kind.argument() {
        Argument::None => {
            if !rest.is_empty() {
                return Err(ParseError::UnexpectedArgument(kind));
            }
            String::new()
        }
        Argument::Name => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument(kind));
            }
            validate_name(rest)?;
            rest.to_string()
        }
        Argument::OptionalName => {
            if !rest.is_empty() {
                validate_name(rest)?;
            }
            rest.to_string()
        }
        Argument::Message => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument(kind));
            }
            if rest.len() > MAX_MESSAGE_LEN {
                return Err(ParseError::MessageTooLong {
                    len: rest.len(),
                    max: MAX_MESSAGE_LEN,
                });
            }
            // One timeline entry is one line of a TIMELINE answer.
            if rest.contains(char::is_control) {
                return Err(ParseError::InvalidMessage);
            }
            rest.to_string()
        }
    };

    Ok((kind, payload))
}

fn validate_name(name: &str) -> Result<(), ParseError> {
    if name.contains(char::is_whitespace) {
        return Err(ParseError::InvalidName(name.to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ParseError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}
