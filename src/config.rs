//! Server configuration
//!
//! Sourced from environment variables and command-line flags, with
//! documented defaults. Kept out of the core components: everything else
//! receives a ready-made `Config`.

use std::env;

pub const ENV_SERVER_HOST: &str = "SERVER_HOST";
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";
pub const ENV_MAX_SESSIONS: &str = "MAX_SESSIONS";

pub const ARG_SINGLE_THREADED: &str = "--single-threaded";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Runtime configuration for one server instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host
    pub host: String,
    /// Bind port (0 lets the OS pick, useful in tests)
    pub port: u16,
    /// Upper bound on concurrently admitted sessions
    pub max_sessions: usize,
    /// Worker threads for the runtime (minimum 1 so the accept loop can
    /// always make progress)
    pub worker_threads: usize,
}

impl Config {
    /// Build a config from the process environment and the given args.
    pub fn from_env<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let single_threaded = args.into_iter().any(|arg| arg == ARG_SINGLE_THREADED);
        let worker_threads = if single_threaded {
            1
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };

        Self {
            host: env::var(ENV_SERVER_HOST).unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var(ENV_SERVER_PORT)
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            max_sessions: env::var(ENV_MAX_SESSIONS)
                .ok()
                .and_then(|m| m.parse().ok())
                .unwrap_or(DEFAULT_MAX_SESSIONS),
            worker_threads: worker_threads.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_threaded_flag() {
        let config = Config::from_env([ARG_SINGLE_THREADED.to_string()]);
        assert_eq!(config.worker_threads, 1);
    }

    #[test]
    fn test_worker_threads_at_least_one() {
        let config = Config::from_env(std::iter::empty::<String>());
        assert!(config.worker_threads >= 1);
    }
}
