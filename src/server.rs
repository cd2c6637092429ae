//! Server state machine
//!
//! Owns the listening socket, the accept loop, the admission semaphore,
//! and the session/room registries, and exposes the administrative
//! command surface. Start-once, stop-once: `NotStarted -> Started ->
//! Stopped`, with `Stopped` terminal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{sanitize, split_command, COMMAND_EXIT, COMMAND_PROMPT};
use crate::config::Config;
use crate::error::AppError;
use crate::room_set::RoomSet;
use crate::session_manager::SessionManager;
use crate::types::Lifecycle;

const ADMIN_SHUTDOWN: &str = "shutdown";
const ADMIN_ROOMS: &str = "rooms";
const ADMIN_THREADS: &str = "threads";
const ADMIN_SESSIONS: &str = "sessions";

/// Notice delivered to every room member before their session is stopped
const SHUTDOWN_NOTICE: &str = "Server is shutting down!";

/// Multi-room chat server
pub struct Server {
    host: String,
    port: u16,
    sessions: Arc<SessionManager>,
    rooms: Arc<RoomSet>,
    admission: Arc<Semaphore>,
    guard: Mutex<ServerGuard>,
}

/// Mutable server state behind the server lock
struct ServerGuard {
    state: Lifecycle,
    accept: Option<JoinHandle<()>>,
    shutdown: Option<CancellationToken>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            sessions: Arc::new(SessionManager::new()),
            rooms: Arc::new(RoomSet::new()),
            admission: Arc::new(Semaphore::new(config.max_sessions)),
            guard: Mutex::new(ServerGuard {
                state: Lifecycle::NotStarted,
                accept: None,
                shutdown: None,
                local_addr: None,
            }),
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.guard.lock().state
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == Lifecycle::Stopped
    }

    /// Bound address, available once `run` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.guard.lock().local_addr
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Bind the listener and start the accept loop. Valid exactly once.
    pub async fn run(&self) -> Result<(), AppError> {
        {
            let mut guard = self.guard.lock();
            if guard.state != Lifecycle::NotStarted {
                return Err(AppError::invalid_state("run", guard.state));
            }
            // Reserve the transition; a failed bind lands in Stopped so the
            // instance can never be run twice.
            guard.state = Lifecycle::Started;
        }

        let listener = match TcpListener::bind((self.host.as_str(), self.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                self.guard.lock().state = Lifecycle::Stopped;
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let accept = tokio::spawn(accept_loop(
            listener,
            shutdown.clone(),
            Arc::clone(&self.sessions),
            Arc::clone(&self.rooms),
            Arc::clone(&self.admission),
        ));

        {
            let mut guard = self.guard.lock();
            guard.local_addr = Some(local_addr);
            guard.shutdown = Some(shutdown);
            guard.accept = Some(accept);
        }

        info!("Server listening on {}", local_addr);
        Ok(())
    }

    /// Administrative command surface.
    ///
    /// Accepts a prompt-prefixed token: `/shutdown <seconds>`, `/exit`,
    /// `/rooms`, `/threads`, `/sessions`. Unrecognized input is logged as
    /// invalid and ignored. Fails with an invalid-state error unless the
    /// server is started.
    pub async fn send_command(&self, input: &str) -> Result<(), AppError> {
        {
            let state = self.guard.lock().state;
            if state != Lifecycle::Started {
                return Err(AppError::invalid_state("send command", state));
            }
        }

        let line = sanitize(input);
        let (cmd, args) = split_command(&line);

        let Some(token) = cmd.strip_prefix(COMMAND_PROMPT) else {
            warn!("Invalid command: '{}'", line);
            return Ok(());
        };

        match token {
            ADMIN_SHUTDOWN => match args.first().and_then(|s| s.parse::<u64>().ok()) {
                Some(seconds) => {
                    self.shutdown_and_join(Duration::from_secs(seconds)).await?;
                }
                None => warn!("shutdown requires a timeout in seconds"),
            },
            COMMAND_EXIT => {
                self.shutdown_and_join(Duration::ZERO).await?;
            }
            ADMIN_ROOMS => self.rooms.log_rooms(),
            ADMIN_THREADS => {
                let workers = tokio::runtime::Handle::current().metrics().num_workers();
                info!("{} worker threads", workers);
            }
            ADMIN_SESSIONS => info!("{} open sessions", self.sessions.len()),
            _ => warn!("Invalid command: '{}'", line),
        }

        Ok(())
    }

    /// Run the stop sequence, then wait up to `timeout` for the remaining
    /// session tasks to drain. Fails with an invalid-state error unless
    /// the server is started.
    pub async fn shutdown_and_join(&self, timeout: Duration) -> Result<(), AppError> {
        self.stop().await?;

        let deadline = tokio::time::Instant::now() + timeout;
        while !self.sessions.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let remaining = self.sessions.len();
        if remaining > 0 {
            warn!(
                "{} sessions still draining after {:?}, abandoning wait",
                remaining, timeout
            );
        } else {
            info!("Server shut down cleanly");
        }
        Ok(())
    }

    /// Stop sequence: transition to Stopped first (no further admin
    /// commands or admissions), cancel and join the accept loop, then stop
    /// every rostered session.
    async fn stop(&self) -> Result<(), AppError> {
        let (shutdown, accept) = {
            let mut guard = self.guard.lock();
            if guard.state != Lifecycle::Started {
                return Err(AppError::invalid_state("stop", guard.state));
            }
            guard.state = Lifecycle::Stopped;
            (guard.shutdown.take(), guard.accept.take())
        };

        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }
        self.admission.close();
        if let Some(accept) = accept {
            // The accept task owns the listener; joining it also closes
            // the listening socket.
            let _ = accept.await;
        }

        // Queued ahead of each session's Exit, so the writer delivers the
        // notice before it terminates.
        self.rooms.broadcast(SHUTDOWN_NOTICE);

        for session in self.sessions.roster() {
            if let Err(e) = session.stop() {
                debug!("Session {} already stopping: {}", session.id(), e);
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// The server's single background task.
///
/// Each iteration acquires one admission slot (suspending at capacity -
/// the backpressure bound on concurrent sessions), accepts one connection,
/// and starts a session whose stop notification returns the slot.
async fn accept_loop(
    listener: TcpListener,
    shutdown: CancellationToken,
    sessions: Arc<SessionManager>,
    rooms: Arc<RoomSet>,
    admission: Arc<Semaphore>,
) {
    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = Arc::clone(&admission).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed: the expected shutdown condition
                    info!("Admission closed, accept loop stopping");
                    break;
                }
            },
        };

        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("New connection from {}", peer);
                    stream
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    break;
                }
            },
        };

        let session = sessions.create_session(stream, Arc::clone(&rooms));
        let id = session.id();
        info!("Session {} created", id);

        let roster = Arc::clone(&sessions);
        session.set_on_stop(Box::new(move || {
            // Removal before release: a stopping session leaves the roster
            // before its admission slot becomes reusable.
            roster.remove_session(id);
            drop(permit);
        }));

        if let Err(e) = session.start() {
            error!("Session {} failed to start: {}", id, e);
            sessions.remove_session(id);
        }
    }
    info!("Accept loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_sessions: 4,
            worker_threads: 1,
        }
    }

    #[tokio::test]
    async fn test_illegal_uses() {
        let server = Server::new(&test_config());

        // Lifecycle operations before run() are invalid
        let err = server.shutdown_and_join(Duration::ZERO).await.unwrap_err();
        assert!(err.is_invalid_state());
        let err = server.send_command("/sessions").await.unwrap_err();
        assert!(err.is_invalid_state());

        server.run().await.unwrap();

        // run() twice is invalid
        let err = server.run().await.unwrap_err();
        assert!(err.is_invalid_state());

        server.shutdown_and_join(Duration::from_secs(1)).await.unwrap();
        assert!(server.is_stopped());
    }

    #[tokio::test]
    async fn test_exit_command_stops_server() {
        let server = Server::new(&test_config());
        server.run().await.unwrap();
        assert!(server.local_addr().is_some());

        server.send_command("/exit").await.unwrap();
        assert!(server.is_stopped());

        // Terminal: the admin surface is gone
        let err = server.send_command("/rooms").await.unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[tokio::test]
    async fn test_stat_and_invalid_commands_keep_server_running() {
        let server = Server::new(&test_config());
        server.run().await.unwrap();

        server.send_command("/rooms").await.unwrap();
        server.send_command("/threads").await.unwrap();
        server.send_command("/sessions").await.unwrap();
        server.send_command("/bogus").await.unwrap();
        server.send_command("no prompt").await.unwrap();
        // Missing timeout argument: warned and ignored
        server.send_command("/shutdown").await.unwrap();

        assert_eq!(server.state(), Lifecycle::Started);
        server.shutdown_and_join(Duration::from_secs(1)).await.unwrap();
    }
}
