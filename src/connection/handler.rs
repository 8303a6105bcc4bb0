//! Reader Workers
//!
//! Each admitted connection is served by one reader worker. The reader owns
//! the socket's read half for the whole session; answers travel through the
//! connection's outbox instead (see `outbox`).
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Reader claims the connection from the admission gate
//!        │
//!        ▼
//! 2. UNAUTHENTICATED: first frame must be a valid LOGIN
//!        │  anything else ──> close, nothing registered
//!        │  LOGIN rejected ──> answer, close
//!        ▼
//! 3. ACTIVE
//!    ┌──────────────────────────────┐
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read frame from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse with session key  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Enqueue (even if bad)   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. TERMINATED: explicit UNREGISTER (executed by the executors), or
//!    end-of-stream / transport error (implicit UNREGISTER run right here)
//! ```

use crate::connection::outbox::{spawn_writer, ConnectionHandle, DeliveryError};
use crate::engine::{Engine, QueueClosed};
use crate::protocol::{Command, CommandKind, FrameError, FrameReader, StatusCode};
use crate::registry::ClientKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Server-wide counters
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Successful logins
    pub logins: AtomicU64,
    /// Commands taken off the queue
    pub commands_processed: AtomicU64,
    /// Requests that failed to parse
    pub parse_errors: AtomicU64,
    /// Answers pushed to an outbox
    pub answers_sent: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn login(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn answer_sent(&self) {
        self.answers_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a connection ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] FrameError),

    /// Client disconnected between frames
    #[error("client disconnected")]
    ClientDisconnected,

    /// The first frame was not a well-formed LOGIN
    #[error("first request must be LOGIN, got {0:?}")]
    LoginRequired(String),

    /// LOGIN was answered with a failure
    #[error("login rejected: status {0}")]
    LoginRejected(StatusCode),

    /// The writer side of the connection is gone
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Server is shutting down
    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
}

/// Serves one client connection from its LOGIN to its end.
pub struct ConnectionHandler<R> {
    reader: FrameReader<R>,
    connection: ConnectionHandle,
    peer: String,
    engine: Arc<Engine>,
    /// Session key once logged in, until the session is torn down
    key: Option<ClientKey>,
}

impl<R: AsyncRead + Unpin> ConnectionHandler<R> {
    /// Creates a handler reading from `reader` and answering through
    /// `connection`.
    pub fn new(reader: R, connection: ConnectionHandle, engine: Arc<Engine>) -> Self {
        Self {
            reader: FrameReader::new(reader, engine.max_frame_size),
            peer: connection.peer().to_string(),
            connection,
            engine,
            key: None,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");
        self.engine.stats.connection_opened();

        let result = self.serve().await;

        // Still registered: no explicit UNREGISTER was queued, clean up here.
        if let Some(key) = self.key.take() {
            let farewell =
                Command::implicit_unregister(key).with_connection(self.connection.clone());
            self.engine.dispatcher.dispatch(farewell);
        }

        match &result {
            Ok(()) => info!(client = %self.peer, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.peer, "Client disconnected")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Connection closed"),
        }

        self.engine.stats.connection_closed();
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let key = self.login().await?;
        self.key = Some(key);
        self.main_loop(key).await
    }

    /// Performs the LOGIN step synchronously, outside the queue.
    async fn login(&mut self) -> Result<ClientKey, ConnectionError> {
        let frame = self
            .reader
            .read_frame()
            .await?
            .ok_or(ConnectionError::ClientDisconnected)?;

        let command = Command::parse(&frame, None);
        if !command.is_parsed() || command.kind != CommandKind::Login {
            return Err(ConnectionError::LoginRequired(command.raw));
        }

        let answer = self.engine.dispatcher.login(&command, self.connection.clone());
        let status = answer.status;
        self.connection.send_frame(answer.encode())?;
        self.engine.stats.answer_sent();

        if !status.is_ok() {
            return Err(ConnectionError::LoginRejected(status));
        }

        self.engine.stats.login();
        debug!(client = %self.peer, key = %answer.destination, "Logged in as {}", command.payload);
        Ok(answer.destination)
    }

    /// Reads, parses and enqueues until the client leaves.
    async fn main_loop(&mut self, key: ClientKey) -> Result<(), ConnectionError> {
        while let Some(frame) = self.reader.read_frame().await? {
            let command =
                Command::parse(&frame, Some(key)).with_connection(self.connection.clone());
            let leaving = command.is_parsed() && command.kind == CommandKind::Unregister;

            self.engine.queue.enqueue(command).await?;

            if leaving {
                // The executor that runs it owns the cleanup and the farewell.
                self.key = None;
                return Ok(());
            }
        }

        Err(ConnectionError::ClientDisconnected)
    }
}

/// Serves an accepted TCP connection: spawns its writer and runs the reader.
pub async fn serve_connection(stream: TcpStream, peer: String, engine: Arc<Engine>) {
    let (read_half, write_half) = stream.into_split();
    let (connection, outbox) = ConnectionHandle::channel(peer.clone());
    spawn_writer(write_half, peer, outbox);

    let handler = ConnectionHandler::new(read_half, connection, engine);
    // Outcome already logged by `run`.
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::engine::spawn_executors;
    use crate::protocol::{encode_frame, DEFAULT_MAX_FRAME_SIZE};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::task::JoinHandle;

    struct TestClient {
        input: DuplexStream,
        answers: UnboundedReceiver<Bytes>,
        task: JoinHandle<Result<(), ConnectionError>>,
    }

    impl TestClient {
        fn connect(engine: &Arc<Engine>, peer: &str) -> Self {
            let (input, server) = tokio::io::duplex(1024);
            let (connection, answers) = ConnectionHandle::channel(peer);
            let handler = ConnectionHandler::new(server, connection, Arc::clone(engine));
            Self {
                input,
                answers,
                task: tokio::spawn(handler.run()),
            }
        }

        async fn send(&mut self, line: &str) {
            self.input.write_all(&encode_frame(line.as_bytes())).await.unwrap();
        }

        async fn answer(&mut self) -> String {
            let frame = tokio::time::timeout(Duration::from_secs(2), self.answers.recv())
                .await
                .expect("answer timed out")
                .expect("outbox closed");
            String::from_utf8(frame.to_vec()).unwrap()
        }
    }

    fn engine() -> Arc<Engine> {
        let engine = Arc::new(Engine::new(&ServerConfig::default()));
        spawn_executors(4, Arc::clone(&engine));
        engine
    }

    #[tokio::test]
    async fn test_login_then_commands() {
        let engine = engine();
        let mut client = TestClient::connect(&engine, "alice-conn");

        client.send("LOGIN alice").await;
        assert_eq!(client.answer().await, "0 LOGIN alice");

        client.send("PUBLISH hello").await;
        client.send("TIMELINE").await;
        assert_eq!(client.answer().await, "0 PUBLISH 0");
        assert_eq!(client.answer().await, "0 TIMELINE 1\nalice hello");
        assert_eq!(engine.stats.logins.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_first_frame_must_be_login() {
        let engine = engine();
        let mut client = TestClient::connect(&engine, "rude");

        client.send("TIMELINE").await;
        let result = client.task.await.unwrap();

        assert!(matches!(result, Err(ConnectionError::LoginRequired(_))));
        assert!(engine.registry().is_empty());
        assert!(engine.queue.is_empty());
        // Nothing was answered; the outbox closes with the handler.
        assert!(client.answers.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_closes_connection() {
        let engine = engine();
        let mut first = TestClient::connect(&engine, "first");
        first.send("LOGIN alice").await;
        assert_eq!(first.answer().await, "0 LOGIN alice");

        let mut second = TestClient::connect(&engine, "second");
        second.send("LOGIN alice").await;
        assert_eq!(
            second.answer().await,
            format!(
                "2 LOGIN client key {} already in use",
                ClientKey::from_name("alice")
            )
        );

        let result = second.task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConnectionError::LoginRejected(StatusCode::DuplicateKey))
        ));
        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_connection_open() {
        let engine = engine();
        let mut client = TestClient::connect(&engine, "alice-conn");
        client.send("LOGIN alice").await;
        client.answer().await;

        client.send("SHOUT hi").await;
        client.send("RDV").await;
        assert_eq!(client.answer().await, "1 PARSE_ERROR unknown command 'SHOUT'");
        assert_eq!(client.answer().await, "0 RDV");
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let engine = engine();
        let mut client = TestClient::connect(&engine, "alice-conn");
        client.send("LOGIN alice").await;
        client.answer().await;
        assert!(engine.registry().contains(ClientKey::from_name("alice")));

        drop(client.input);
        let result = client.task.await.unwrap();

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert!(!engine.registry().contains(ClientKey::from_name("alice")));
        assert_eq!(engine.stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_explicit_unregister() {
        let engine = engine();
        let mut client = TestClient::connect(&engine, "alice-conn");
        client.send("LOGIN alice").await;
        client.answer().await;

        client.send("UNREGISTER").await;
        assert_eq!(client.answer().await, "0 UNREGISTER alice");

        let result = client.task.await.unwrap();
        assert!(result.is_ok());
        assert!(engine.registry().is_empty());
        // Session and reader are both gone, so is every handle.
        assert!(client.answers.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_a_transport_error() {
        let engine = engine();
        let mut client = TestClient::connect(&engine, "alice-conn");
        client.send("LOGIN alice").await;
        client.answer().await;

        let huge = (DEFAULT_MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        client.input.write_all(&huge).await.unwrap();

        let result = client.task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConnectionError::Transport(FrameError::TooLarge { .. }))
        ));
        assert!(engine.registry().is_empty());
    }
}
