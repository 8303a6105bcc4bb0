//! # Murmur - A Multi-Client Publish/Follow Messaging Server
//!
//! Murmur keeps a registry of named clients connected over TCP. Clients log
//! in, follow each other, publish short messages and read the timeline of
//! recent messages from the people they follow.
//!
//! ## Features
//!
//! - **Fixed Worker Pools**: a bounded set of readers serves connections and
//!   a bounded set of executors runs their commands
//! - **Bounded Command Queue**: readers block when executors fall behind
//! - **Ordered Execution**: commands run and are answered in queue order,
//!   whatever the number of executors
//! - **Async I/O**: Built on Tokio
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Murmur                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│  Admission  │───>│   Reader    │──┐  LOGIN /      │
//! │  │ (Acceptor)  │    │    Gate     │    │    Pool     │  │  implicit     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘  │  UNREGISTER   │
//! │                                               │ enqueue │               │
//! │                                               ▼         │               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐  │               │
//! │  │  Outboxes   │<───│  Executor   │<───│   Command   │  │               │
//! │  │ (per conn.) │    │    Pool     │    │    Queue    │  │               │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘  │               │
//! │                            │ Sequencer                  │               │
//! │                            ▼                            │               │
//! │                     ┌──────────────────────────────┐    │               │
//! │                     │  Dispatcher (one at a time)  │<───┘               │
//! │                     │        ──> Registry          │                    │
//! │                     └──────────────────────────────┘                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use murmur::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `LOGIN name`
//! - `PUBLISH message`
//! - `FOLLOW name`
//! - `TIMELINE`
//! - `FOLLOW_COUNT`
//! - `RDV [name]`
//! - `UNREGISTER`
//!
//! Every request is a length-prefixed frame; every answer is one frame of
//! the form `<status> <KIND>[ <text>]`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: framing, request parsing and answer encoding
//! - [`registry`]: client sessions and the bounded registry
//! - [`commands`]: command handlers and the serializing dispatcher
//! - [`engine`]: command queue, admission gate, sequencer and executors
//! - [`connection`]: reader workers and per-connection outboxes
//! - [`server`]: listener, worker pools and shutdown
//! - [`config`]: command-line configuration
//!
//! ## Design Highlights
//!
//! ### One Handler at a Time
//!
//! Every handler runs under a single dispatch lock, so the registry and the
//! follow graph never see two commands interleave.
//!
//! ### Non-Blocking Delivery
//!
//! Answers are pushed to the destination connection's outbox and written by
//! that connection's writer task. A slow client never stalls an executor.

pub mod commands;
pub mod config;
pub mod connection;
pub mod engine;
pub mod protocol;
pub mod registry;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::{CommandHandlers, Dispatcher, SocialGraph};
pub use config::{Invocation, ServerConfig};
pub use connection::{serve_connection, ConnectionHandle, ServerStats};
pub use engine::{CommandQueue, Engine};
pub use protocol::{Answer, Command, CommandKind, StatusCode};
pub use registry::{ClientKey, Registry};
pub use server::Server;

/// The default port Murmur listens on
pub const DEFAULT_PORT: u16 = 5656;

/// The default host Murmur binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Murmur
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
