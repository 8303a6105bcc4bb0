//! Murmur - A Multi-Client Publish/Follow Messaging Server
//!
//! This is the main entry point for the Murmur server.
//! It parses the command line, sets up logging and runs the server until
//! Ctrl+C.

use murmur::config::{usage, Invocation};
use murmur::{Server, ServerConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
Murmur v{} - Publish/Follow Messaging Server
──────────────────────────────────────────────────────────────
Server started on {}
Readers: {}  Executors: {}  Queue: {}  Max clients: {}

Use Ctrl+C to shutdown gracefully.
"#,
        murmur::VERSION,
        config.bind_address(),
        config.readers,
        config.executors,
        config.queue_capacity,
        config.max_clients,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(Invocation::Serve(config)) => config,
        Ok(Invocation::Help) => {
            println!("{}", usage());
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("Murmur version {}", murmur::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", usage());
            std::process::exit(1);
        }
    };

    // Set up logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let server = Server::bind(config.clone()).await?;
    print_banner(&config);
    info!("Listening on {}", server.local_addr()?);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    server.run(shutdown).await;
    Ok(())
}
