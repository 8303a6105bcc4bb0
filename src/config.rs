//! Server Configuration
//!
//! Pool sizes, capacities and the listen address, with defaults matching the
//! classic fixed constants of the server. Values come from command-line
//! arguments.

use crate::engine::DEFAULT_QUEUE_CAPACITY;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::registry::{DEFAULT_MAX_CLIENTS, DEFAULT_TIMELINE_CAPACITY};
use thiserror::Error;

/// Default number of reader workers
pub const DEFAULT_READERS: usize = 200;

/// Default number of executor workers
pub const DEFAULT_EXECUTORS: usize = 200;

/// Errors from argument parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Serve(ServerConfig),
    Help,
    Version,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Reader workers, i.e. connections served at once
    pub readers: usize,
    /// Executor workers
    pub executors: usize,
    /// Commands buffered between readers and executors
    pub queue_capacity: usize,
    /// Registered clients at most
    pub max_clients: usize,
    /// Entries kept per timeline
    pub timeline_capacity: usize,
    /// Largest request frame accepted, in bytes
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            readers: DEFAULT_READERS,
            executors: DEFAULT_EXECUTORS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_clients: DEFAULT_MAX_CLIENTS,
            timeline_capacity: DEFAULT_TIMELINE_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Parses command-line arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = ServerConfig::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                "--host" => config.host = value(&arg, args.next())?,
                "--port" | "-p" => config.port = parse(&arg, args.next())?,
                "--readers" => config.readers = parse(&arg, args.next())?,
                "--executors" => config.executors = parse(&arg, args.next())?,
                "--queue-capacity" => config.queue_capacity = parse(&arg, args.next())?,
                "--max-clients" => config.max_clients = parse(&arg, args.next())?,
                "--timeline" => config.timeline_capacity = parse(&arg, args.next())?,
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        config.validate()?;
        Ok(Invocation::Serve(config))
    }

    /// Rejects zero-sized pools and capacities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("readers", self.readers),
            ("executors", self.executors),
            ("queue capacity", self.queue_capacity),
            ("max clients", self.max_clients),
            ("timeline capacity", self.timeline_capacity),
            ("max frame size", self.max_frame_size),
        ];
        match sizes.into_iter().find(|(_, size)| *size == 0) {
            Some((name, _)) => Err(ConfigError::Zero(name)),
            None => Ok(()),
        }
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value(flag: &str, next: Option<String>) -> Result<String, ConfigError> {
    next.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse<T: std::str::FromStr>(flag: &str, next: Option<String>) -> Result<T, ConfigError> {
    let raw = value(flag, next)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: raw,
    })
}

/// Usage text printed by `--help` and on argument errors.
pub fn usage() -> String {
    format!(
        r#"murmur {version} - publish/follow messaging server

USAGE:
    murmur [OPTIONS]

OPTIONS:
    -p, --port <PORT>            Port to listen on (default: {port})
        --host <HOST>            Host to bind to (default: {host})
        --readers <N>            Connections served at once (default: {readers})
        --executors <N>          Executor workers (default: {executors})
        --queue-capacity <N>     Buffered commands (default: {queue})
        --max-clients <N>        Registered clients at most (default: {clients})
        --timeline <N>           Entries kept per timeline (default: {timeline})
    -v, --version                Print version information
    -h, --help                   Print this help message
"#,
        version = crate::VERSION,
        port = crate::DEFAULT_PORT,
        host = crate::DEFAULT_HOST,
        readers = DEFAULT_READERS,
        executors = DEFAULT_EXECUTORS,
        queue = DEFAULT_QUEUE_CAPACITY,
        clients = DEFAULT_MAX_CLIENTS,
        timeline = DEFAULT_TIMELINE_CAPACITY,
    )
}
