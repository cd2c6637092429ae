//! Multi-Room Line Chat Server Library
//!
//! A concurrent multi-room chat server over TCP with a newline-delimited
//! UTF-8 text protocol, built on tokio.
//!
//! # Features
//! - Line-based client protocol (`/enter <room>`, `/leave`, `/who`, `/exit`,
//!   plain text to chat)
//! - Named rooms created on first join and removed lazily when the last
//!   member leaves
//! - Bounded concurrency: an admission semaphore caps live sessions
//! - Administrative command surface (`/shutdown <seconds>`, `/exit`,
//!   `/rooms`, `/threads`, `/sessions`)
//! - Graceful drain on shutdown
//!
//! # Architecture
//! One accept-loop task per server and exactly two tasks per session:
//! - the reader parses incoming lines into [`Command`]s and enqueues them
//! - the writer drains the queue, mediates room membership, and owns the
//!   transport for writing
//!
//! Shared state (room registry, session roster, per-session state) lives
//! behind short-lived locks that are never held across an await point.
//!
//! # Example
//! ```ignore
//! use roomchat::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env(std::env::args().skip(1));
//!     let server = Server::new(&config);
//!     server.run().await.unwrap();
//!     server.send_command("/shutdown 10").await.unwrap();
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod line;
pub mod room;
pub mod room_set;
pub mod server;
pub mod session;
pub mod session_manager;
pub mod types;

// Re-export main types for convenience
pub use command::{build_message, parse_command, sanitize, split_command, Command};
pub use config::Config;
pub use error::AppError;
pub use room::Room;
pub use room_set::RoomSet;
pub use server::Server;
pub use session::{Session, StopCallback};
pub use session_manager::SessionManager;
pub use types::{Lifecycle, SessionId};
