//! Session manager
//!
//! Tracks every live session for enumeration and shutdown. Not
//! authoritative for room membership; the rooms are.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpStream;

use crate::room_set::RoomSet;
use crate::session::Session;
use crate::types::SessionId;

/// Thread-safe registry of open sessions
pub struct SessionManager {
    session_count: AtomicU64,
    open_sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            session_count: AtomicU64::new(0),
            open_sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next sequential id, build a session around the
    /// connection, and register it.
    pub fn create_session(&self, stream: TcpStream, rooms: Arc<RoomSet>) -> Arc<Session> {
        let id = SessionId(self.session_count.fetch_add(1, Ordering::Relaxed) + 1);
        let session = Session::new(id, stream, rooms);
        self.open_sessions.lock().insert(id, Arc::clone(&session));
        session
    }

    /// Deregister by id; no-op if absent.
    pub fn remove_session(&self, id: SessionId) {
        self.open_sessions.lock().remove(&id);
    }

    /// Point-in-time snapshot of all open sessions.
    pub fn roster(&self) -> Vec<Arc<Session>> {
        self.open_sessions.lock().values().cloned().collect()
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.open_sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::{TcpListener, TcpStream};

    async fn accepted_stream() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        stream
    }

    #[tokio::test]
    async fn test_sequential_ids_from_one() {
        let manager = SessionManager::new();
        let rooms = Arc::new(RoomSet::new());

        let first = manager.create_session(accepted_stream().await, Arc::clone(&rooms));
        let second = manager.create_session(accepted_stream().await, rooms);

        assert_eq!(first.id(), SessionId(1));
        assert_eq!(second.id(), SessionId(2));
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_session() {
        let manager = SessionManager::new();
        let rooms = Arc::new(RoomSet::new());
        let session = manager.create_session(accepted_stream().await, rooms);

        manager.remove_session(session.id());
        assert!(manager.is_empty());

        // Removing an absent id is a no-op
        manager.remove_session(session.id());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_roster_snapshot() {
        let manager = SessionManager::new();
        let rooms = Arc::new(RoomSet::new());
        let session = manager.create_session(accepted_stream().await, rooms);

        let roster = manager.roster();
        assert_eq!(roster.len(), 1);
        assert!(Arc::ptr_eq(&roster[0], &session));
    }
}
