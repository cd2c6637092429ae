//! Basic type definitions for the chat server
//!
//! Provides the session identifier newtype and the lifecycle state enum
//! shared by `Session` and `Server`.

/// Unique session identifier (newtype pattern)
///
/// Sequential, process-unique integer allocated by the `SessionManager`.
/// Not security-sensitive; used only for in-process liveness tracking and
/// as the member key in rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state shared by `Session` and `Server`
///
/// Both are start-once, stop-once state machines: `NotStarted` transitions
/// to `Started` exactly once, `Started` to `Stopped` exactly once, and
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Started,
    Stopped,
}

impl Lifecycle {
    /// Human-readable name used in invalid-state errors and logs
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::NotStarted => "not started",
            Lifecycle::Started => "started",
            Lifecycle::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
