//! Connection Outboxes
//!
//! Every connection gets a writer task that owns the socket's write half and
//! drains an unbounded channel of answer payloads. The sending side of that
//! channel is the [`ConnectionHandle`] stored in the client's session.
//!
//! ```text
//!  executor ──┐
//!             │ send_frame()           ┌──────────────┐
//!  reader ────┼──────────────────────> │ writer task  │ ──> socket
//!             │   (unbounded, FIFO)    └──────────────┘
//! ```
//!
//! Pushing never blocks, so an executor can deliver while it still holds its
//! turn, and frames for one connection reach the socket in push order.
//! Once every handle is dropped the writer flushes and shuts the socket down.

use crate::protocol::write_frame;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// The writer task for this connection has exited.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("connection to {peer} is closed")]
pub struct DeliveryError {
    pub peer: String,
}

/// Sending side of a connection's outbox.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    peer: Arc<str>,
    outbox: mpsc::UnboundedSender<Bytes>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiver its writer drains.
    pub fn channel(peer: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let peer: String = peer.into();
        (
            Self {
                peer: Arc::from(peer),
                outbox,
            },
            rx,
        )
    }

    /// Queues one answer payload for this connection.
    pub fn send_frame(&self, payload: Bytes) -> Result<(), DeliveryError> {
        self.outbox.send(payload).map_err(|_| DeliveryError {
            peer: self.peer.to_string(),
        })
    }

    /// Peer address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Whether both handles feed the same connection's outbox.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.outbox.same_channel(&other.outbox)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_connection(other)
    }
}

impl Eq for ConnectionHandle {}

/// Spawns the writer task for one connection.
pub fn spawn_writer<W>(writer: W, peer: String, mut rx: mpsc::UnboundedReceiver<Bytes>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);

        while let Some(payload) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &payload).await {
                debug!(client = %peer, error = %e, "Failed to write answer");
                return;
            }
            trace!(client = %peer, bytes = payload.len(), "Sent answer");
        }

        // Every handle is gone: no session and no reader need this socket.
        let _ = writer.shutdown().await;
        trace!(client = %peer, "Writer closed");
    })
}
