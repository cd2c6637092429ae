//! Room struct definition
//!
//! A named broadcast group of sessions. Thread-safe: membership lives
//! behind its own lock, and broadcasts operate on a point-in-time snapshot
//! so concurrent joins and leaves never affect an in-flight delivery.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::Command;
use crate::session::Session;
use crate::types::SessionId;

/// Named chat room
///
/// Rooms hold non-owning references to their members in the lifecycle
/// sense: membership is severed by `leave`, which every session performs
/// on departure and on stop. A session appears in at most one room at a
/// time (enforced by the session's writer task, not by the room).
pub struct Room {
    name: String,
    members: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl Room {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current membership count (display/stats only, may be stale by the
    /// time the caller acts on it)
    pub fn size(&self) -> usize {
        self.members.lock().len()
    }

    /// Add a session to the room; idempotent on the same id (overwrite).
    pub fn join(&self, session: Arc<Session>) {
        self.members.lock().insert(session.id(), session);
    }

    /// Remove a member by id, returning it if it was present.
    pub fn leave(&self, id: SessionId) -> Option<Arc<Session>> {
        self.members.lock().remove(&id)
    }

    /// Deliver `Hear(text)` to every member present at call time.
    ///
    /// The snapshot is taken under the lock and delivery happens after it
    /// is released; a member that stopped in between simply misses the
    /// message (its queue rejects the send).
    pub fn post(&self, text: &str) {
        for member in self.snapshot() {
            let _ = member.send(Command::Hear(text.to_string()));
        }
    }

    /// Same snapshot delivery as [`post`](Self::post), skipping the sender.
    pub fn post_from(&self, sender: SessionId, text: &str) {
        for member in self.snapshot() {
            if member.id() != sender {
                let _ = member.send(Command::Hear(text.to_string()));
            }
        }
    }

    /// Sorted snapshot of current member ids.
    pub fn player_names(&self) -> Vec<String> {
        let mut ids: Vec<SessionId> = self.members.lock().keys().copied().collect();
        ids.sort();
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.members.lock().values().cloned().collect()
    }
}
