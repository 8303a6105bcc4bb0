//! Wire Protocol
//!
//! Everything that crosses the socket: frames, requests and answers.
//!
//! ## Modules
//!
//! - `frame`: length-delimited framing over any async byte stream
//! - `command`: request parsing and validation into [`Command`]
//! - `answer`: [`Answer`] values and their wire encoding
//!
//! ## Example
//!
//! ```
//! use murmur::protocol::{Command, CommandKind};
//!
//! let cmd = Command::parse(b"LOGIN alice", None);
//! assert!(cmd.is_parsed());
//! assert_eq!(cmd.kind, CommandKind::Login);
//! assert_eq!(cmd.payload, "alice");
//! ```

pub mod answer;
pub mod command;
pub mod frame;

pub use answer::{Answer, AnswerBody, StatusCode};
pub use command::{
    parse_request, Command, CommandKind, ParseError, ParseStatus, MAX_MESSAGE_LEN, MAX_NAME_LEN,
};
pub use frame::{encode_frame, write_frame, FrameError, FrameReader, DEFAULT_MAX_FRAME_SIZE};
