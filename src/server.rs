//! Server Wiring
//!
//! Binds the listener, spawns the reader and executor pools, and runs the
//! acceptor loop until shutdown.
//!
//! ```text
//!                      ┌──────────────┐   admit()   ┌───────────────┐
//!  TcpListener ───────>│   acceptor   │────────────>│ AdmissionGate │
//!                      └──────────────┘             └───────┬───────┘
//!                                                           │ claim()
//!                                  ┌────────────────────────┼──────────┐
//!                                  ▼                        ▼          ▼
//!                             reader 0                 reader 1 ... reader N
//!                                  │                        │          │
//!                                  └──────────> CommandQueue <─────────┘
//!                                                    │
//!                                  ┌─────────────────┼──────────────┐
//!                                  ▼                 ▼              ▼
//!                             executor 0        executor 1 ... executor M
//! ```

use crate::config::ServerConfig;
use crate::connection::serve_connection;
use crate::engine::{spawn_executors, AdmissionGate, Engine};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Admitted = (TcpStream, SocketAddr);

/// A bound server, ready to run.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    engine: Arc<Engine>,
    gate: Arc<AdmissionGate<Admitted>>,
}

impl Server {
    /// Binds the listener described by `config`.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let engine = Arc::new(Engine::new(&config));
        Ok(Self {
            listener,
            config,
            engine,
            gate: Arc::new(AdmissionGate::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared engine, for inspection.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Spawns both worker pools and accepts connections until `shutdown`
    /// resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut workers = spawn_executors(self.config.executors, Arc::clone(&self.engine));
        workers.extend(spawn_readers(
            self.config.readers,
            Arc::clone(&self.gate),
            Arc::clone(&self.engine),
        ));
        info!(
            readers = self.config.readers,
            executors = self.config.executors,
            queue_capacity = self.config.queue_capacity,
            "Worker pools started"
        );

        tokio::select! {
            _ = accept_loop(&self.listener, &self.gate) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        self.gate.close();
        self.engine.queue.close();
        for worker in workers {
            worker.abort();
        }

        let stats = &self.engine.stats;
        info!(
            connections = stats.connections_accepted.load(Ordering::Relaxed),
            logins = stats.logins.load(Ordering::Relaxed),
            commands = stats.commands_processed.load(Ordering::Relaxed),
            parse_errors = stats.parse_errors.load(Ordering::Relaxed),
            answers = stats.answers_sent.load(Ordering::Relaxed),
            "Server shutdown complete"
        );
    }
}

fn spawn_readers(
    count: usize,
    gate: Arc<AdmissionGate<Admitted>>,
    engine: Arc<Engine>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let gate = Arc::clone(&gate);
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                while let Some((stream, addr)) = gate.claim().await {
                    debug!(reader = id, client = %addr, "Connection claimed");
                    serve_connection(stream, addr.to_string(), Arc::clone(&engine)).await;
                }
                debug!(reader = id, "Admission gate closed, reader exiting");
            })
        })
        .collect()
}

/// Accepts connections and hands each to a reader, one at a time.
async fn accept_loop(listener: &TcpListener, gate: &AdmissionGate<Admitted>) {
    loop {
        match listener.accept().await {
            Ok(admitted) => {
                if gate.admit(admitted).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{write_frame, FrameReader, DEFAULT_MAX_FRAME_SIZE};
    use crate::registry::ClientKey;
    use std::time::Duration;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<Engine>) {
        let server = Server::bind(ServerConfig {
            port: 0,
            ..config
        })
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let engine = Arc::clone(server.engine());
        tokio::spawn(server.run(std::future::pending()));
        (addr, engine)
    }

    fn small_config() -> ServerConfig {
        ServerConfig {
            readers: 8,
            executors: 4,
            ..ServerConfig::default()
        }
    }

    struct Client {
        reader: FrameReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, writer) = stream.into_split();
            Self {
                reader: FrameReader::new(read_half, DEFAULT_MAX_FRAME_SIZE),
                writer,
            }
        }

        async fn login(addr: SocketAddr, name: &str) -> Self {
            let mut client = Self::connect(addr).await;
            client.send(&format!("LOGIN {}", name)).await;
            assert_eq!(client.recv().await, format!("0 LOGIN {}", name));
            client
        }

        async fn send(&mut self, line: &str) {
            write_frame(&mut self.writer, line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> String {
            let frame = tokio::time::timeout(Duration::from_secs(2), self.reader.read_frame())
                .await
                .expect("answer timed out")
                .unwrap()
                .expect("server closed the connection");
            String::from_utf8(frame.to_vec()).unwrap()
        }

        async fn closed(&mut self) -> bool {
            matches!(
                tokio::time::timeout(Duration::from_secs(2), self.reader.read_frame()).await,
                Ok(Ok(None)) | Ok(Err(_))
            )
        }

        async fn request(&mut self, line: &str) -> String {
            self.send(line).await;
            self.recv().await
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_publish_follow_timeline_over_tcp() {
        let (addr, _) = start_server(small_config()).await;
        let mut alice = Client::login(addr, "alice").await;
        let mut bob = Client::login(addr, "bob").await;

        assert_eq!(bob.request("FOLLOW alice").await, "0 FOLLOW alice");

        for msg in ["hello", "world", "x", "y", "z", "extra"] {
            alice.send(&format!("PUBLISH {}", msg)).await;
        }
        for _ in 0..6 {
            assert_eq!(alice.recv().await, "0 PUBLISH 1");
        }

        assert_eq!(
            bob.request("TIMELINE").await,
            "0 TIMELINE 5\nalice extra\nalice z\nalice y\nalice x\nalice world"
        );
        assert_eq!(alice.request("FOLLOW_COUNT").await, "0 FOLLOW_COUNT 1");
    }

    #[tokio::test]
    async fn test_follow_count_counts_distinct_followers() {
        let (addr, engine) = start_server(small_config()).await;
        let mut star = Client::login(addr, "star").await;

        let mut fans = vec![];
        for i in 0..5 {
            let mut fan = Client::login(addr, &format!("fan{}", i)).await;
            assert_eq!(fan.request("FOLLOW star").await, "0 FOLLOW star");
            fans.push(fan);
        }

        assert_eq!(star.request("FOLLOW_COUNT").await, "0 FOLLOW_COUNT 5");

        // Departed followers no longer count, whichever way they left.
        assert_eq!(fans[0].request("UNREGISTER").await, "0 UNREGISTER fan0");
        drop(fans.remove(1));
        wait_until(|| !engine.registry().contains(ClientKey::from_name("fan1"))).await;

        assert_eq!(star.request("FOLLOW_COUNT").await, "0 FOLLOW_COUNT 3");
    }

    #[tokio::test]
    async fn test_pipelined_commands_answered_in_order() {
        let (addr, _) = start_server(ServerConfig {
            queue_capacity: 2,
            ..small_config()
        })
        .await;
        let mut alice = Client::login(addr, "alice").await;
        let mut bob = Client::login(addr, "bob").await;

        for i in 0..30 {
            alice.send(&format!("PUBLISH a{}", i)).await;
            bob.send("RDV alice").await;
        }

        for _ in 0..30 {
            assert_eq!(alice.recv().await, "0 PUBLISH 0");
            assert_eq!(bob.recv().await, "0 RDV alice");
        }
        assert_eq!(
            alice.request("TIMELINE").await,
            "0 TIMELINE 5\nalice a29\nalice a28\nalice a27\nalice a26\nalice a25"
        );
    }

    #[tokio::test]
    async fn test_malformed_requests_get_parse_errors() {
        let (addr, engine) = start_server(small_config()).await;
        let mut alice = Client::login(addr, "alice").await;

        assert_eq!(
            alice.request("DANCE").await,
            "1 PARSE_ERROR unknown command 'DANCE'"
        );
        assert_eq!(
            alice.request(&format!("PUBLISH {}", "m".repeat(65))).await,
            "1 PARSE_ERROR message too long: 65 bytes (max: 64)"
        );
        assert_eq!(alice.request("TIMELINE").await, "0 TIMELINE 0");
        assert_eq!(engine.stats.parse_errors.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let (addr, _) = start_server(small_config()).await;
        let mut alice = Client::login(addr, "alice").await;

        assert_eq!(alice.request("FOLLOW nobody").await, "4 FOLLOW unknown client nobody");
        assert_eq!(alice.request("RDV nobody").await, "4 RDV unknown client nobody");
        assert_eq!(alice.request("FOLLOW alice").await, "6 FOLLOW cannot follow yourself");
        assert_eq!(alice.request("FOLLOW_COUNT").await, "0 FOLLOW_COUNT 0");
    }

    #[tokio::test]
    async fn test_login_rules() {
        let (addr, engine) = start_server(small_config()).await;

        let mut rude = Client::connect(addr).await;
        rude.send("TIMELINE").await;
        assert!(rude.closed().await);

        let _alice = Client::login(addr, "alice").await;
        let mut impostor = Client::connect(addr).await;
        impostor.send("LOGIN alice").await;
        assert!(impostor.recv().await.starts_with("2 LOGIN"));
        assert!(impostor.closed().await);

        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_registry_full() {
        let (addr, _) = start_server(ServerConfig {
            max_clients: 2,
            ..small_config()
        })
        .await;
        let _a = Client::login(addr, "a").await;
        let _b = Client::login(addr, "b").await;

        let mut c = Client::connect(addr).await;
        c.send("LOGIN c").await;
        assert_eq!(c.recv().await, "3 LOGIN registry full: 2 clients registered");
        assert!(c.closed().await);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_and_frees_name() {
        let (addr, engine) = start_server(small_config()).await;
        let alice = Client::login(addr, "alice").await;
        drop(alice);

        let key = ClientKey::from_name("alice");
        wait_until(|| !engine.registry().contains(key)).await;

        let _again = Client::login(addr, "alice").await;
        assert!(engine.registry().contains(key));
    }

    #[tokio::test]
    async fn test_explicit_unregister_closes_connection() {
        let (addr, engine) = start_server(small_config()).await;
        let mut alice = Client::login(addr, "alice").await;

        assert_eq!(alice.request("UNREGISTER").await, "0 UNREGISTER alice");
        assert!(alice.closed().await);
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_readers_bound_concurrent_sessions() {
        let (addr, _) = start_server(ServerConfig {
            readers: 1,
            ..small_config()
        })
        .await;
        let mut alice = Client::login(addr, "alice").await;

        // The only reader is busy with alice: bob waits at the gate.
        let mut bob = Client::connect(addr).await;
        bob.send("LOGIN bob").await;
        assert!(
            tokio::time::timeout(Duration::from_millis(100), bob.reader.read_frame())
                .await
                .is_err()
        );

        assert_eq!(alice.request("UNREGISTER").await, "0 UNREGISTER alice");
        assert_eq!(bob.recv().await, "0 LOGIN bob");
    }
}
