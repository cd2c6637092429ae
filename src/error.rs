//! Error types for the chat server
//!
//! Defines application-level errors using thiserror.

use thiserror::Error;

use crate::types::Lifecycle;

/// Application-level errors
///
/// Covers lifecycle misuse (surfaced to the caller, never retried) and
/// fatal transport/channel failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Lifecycle operation called outside its required state
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: Lifecycle,
    },

    /// IO error (fatal for the affected connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Command queue closed (session writer already gone)
    #[error("command queue closed")]
    QueueClosed,
}

impl AppError {
    /// Shorthand for the invalid-state variant
    pub fn invalid_state(operation: &'static str, state: Lifecycle) -> Self {
        AppError::InvalidState { operation, state }
    }

    /// True if this error is lifecycle misuse rather than an IO failure
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, AppError::InvalidState { .. })
    }
}
