//! Connection Module
//!
//! This module manages individual client connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Acceptor ──> AdmissionGate                     │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ claim()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler (reader)                  │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read frame  │───>│ Parse       │───>│ Enqueue     │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//!                                                │
//!                          executors ◄───────────┘
//!                              │ send_frame()
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           ConnectionHandle ──> writer task ──> socket       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;
pub mod outbox;

pub use handler::{serve_connection, ConnectionError, ConnectionHandler, ServerStats};
pub use outbox::{spawn_writer, ConnectionHandle, DeliveryError};
