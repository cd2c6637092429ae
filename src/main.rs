//! Multi-Room Line Chat Server - Entry Point
//!
//! Builds the runtime with the configured worker-thread count, starts the
//! server, and feeds operator input from stdin to the administrative
//! command surface.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomchat::{Config, Server};

/// Grace period for runtime teardown after the server has stopped
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=roomchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomchat=info")),
        )
        .init();

    let config = Config::from_env(std::env::args().skip(1));
    info!("Starting");
    info!(
        "Host: {}, Port: {}, Max sessions: {}, Worker threads: {}",
        config.host, config.port, config.max_sessions, config.worker_threads
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    // Forces any work that outlived the graceful drain
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    info!("Shutting down");
    Ok(())
}

/// Run the server and poll stdin for administrative commands until the
/// server reports stopped.
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::new(&config);
    server.run().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !server.is_stopped() {
        match lines.next_line().await? {
            Some(line) => {
                if let Err(e) = server.send_command(&line).await {
                    warn!("Admin command rejected: {}", e);
                    break;
                }
            }
            None => {
                // Operator channel closed: shut down gracefully
                info!("Stdin closed, shutting down");
                server
                    .shutdown_and_join(RUNTIME_SHUTDOWN_TIMEOUT)
                    .await
                    .ok();
                break;
            }
        }
    }

    Ok(())
}
