//! Room registry
//!
//! A thread-safe collection of rooms. One lock covers the whole map so the
//! compound operations (get-or-create, check-and-remove) are atomic with
//! respect to each other: two callers racing `get_room` observe a single
//! `Room` instance, and `check_room` can never remove a room that gained a
//! member after the emptiness check.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::room::Room;
use crate::session::Session;

/// Thread-safe mapping of room name to room
pub struct RoomSet {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomSet {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Number of open rooms
    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the room registered under `name`, creating it if absent.
    pub fn get_room(&self, name: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock();
        Arc::clone(
            rooms
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Room::new(name))),
        )
    }

    /// Get-or-create the room registered under `name` and add `session`
    /// to it, all under the registry lock.
    ///
    /// The compound form closes the window between a lookup and the join:
    /// a racing `check_room` from a last leaver can never vacate the room
    /// while the joiner is between the two steps, so no second `Room`
    /// instance for the same name can ever be observed.
    pub fn join_room(&self, name: &str, session: Arc<Session>) -> Arc<Room> {
        let mut rooms = self.rooms.lock();
        let room = Arc::clone(
            rooms
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Room::new(name))),
        );
        room.join(session);
        room
    }

    /// Deliver a notice to every member of every open room.
    ///
    /// The room list is snapshotted under the registry lock; delivery
    /// happens after it is released.
    pub fn broadcast(&self, text: &str) {
        let rooms: Vec<Arc<Room>> = self.rooms.lock().values().cloned().collect();
        for room in rooms {
            room.post(text);
        }
    }

    /// Remove the room registered under `name` if it has no members.
    ///
    /// Called by the last leaver; rooms are deleted lazily at departure,
    /// never by background scanning.
    pub fn check_room(&self, name: &str) {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms.get(name) {
            if room.size() == 0 {
                rooms.remove(name);
                debug!("Room '{}' removed (empty)", name);
            }
        }
    }

    /// Log the open rooms and their member counts.
    ///
    /// Counts are read without coordinating with in-flight joins, so they
    /// may lag the actual membership; acceptable for stats output.
    pub fn log_rooms(&self) {
        let rooms = self.rooms.lock();
        info!("{} open rooms", rooms.len());
        for (name, room) in rooms.iter() {
            info!("{}: {}", name, room.size());
        }
    }
}

impl Default for RoomSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::SessionId;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_session(id: u64) -> Arc<Session> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        Session::new(SessionId(id), stream, Arc::new(RoomSet::new()))
    }

    #[test]
    fn test_basic_room_set_behaviour() {
        let rooms = RoomSet::new();
        assert_eq!(rooms.len(), 0);

        let room = rooms.get_room("test");
        assert_eq!(room.name(), "test");
        assert_eq!(rooms.len(), 1);

        rooms.check_room("test");
        assert_eq!(rooms.len(), 0);
    }

    #[test]
    fn test_get_room_returns_same_instance() {
        let rooms = RoomSet::new();
        let a = rooms.get_room("lobby");
        let b = rooms.get_room("lobby");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn test_check_room_on_unknown_name_is_noop() {
        let rooms = RoomSet::new();
        rooms.check_room("nope");
        assert_eq!(rooms.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_room_creates_one_instance() {
        let rooms = Arc::new(RoomSet::new());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let rooms = Arc::clone(&rooms);
            handles.push(tokio::spawn(async move { rooms.get_room("shared") }));
        }

        let first = rooms.get_room("shared");
        for handle in handles {
            let room = handle.await.unwrap();
            assert!(Arc::ptr_eq(&first, &room));
        }
        assert_eq!(rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_join_room_registers_the_member() {
        let rooms = RoomSet::new();
        let session = test_session(1).await;

        let room = rooms.join_room("attic", Arc::clone(&session));
        assert_eq!(room.size(), 1);

        // Occupied rooms survive a vacate check
        rooms.check_room("attic");
        assert_eq!(rooms.len(), 1);
        assert!(Arc::ptr_eq(&room, &rooms.get_room("attic")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_join_room_survives_concurrent_vacate() {
        let rooms = Arc::new(RoomSet::new());
        let session = test_session(1).await;

        let checker = {
            let rooms = Arc::clone(&rooms);
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    rooms.check_room("attic");
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..1_000 {
            let room = rooms.join_room("attic", Arc::clone(&session));
            // The joiner is a member, so no concurrent vacate check may
            // have removed the room: the registry still maps the name to
            // this same instance.
            assert!(Arc::ptr_eq(&room, &rooms.get_room("attic")));
            room.leave(session.id());
            rooms.check_room("attic");
        }

        checker.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_get_check_stress() {
        let rooms = Arc::new(RoomSet::new());

        let mut handles = Vec::new();
        for worker in 0..8 {
            let rooms = Arc::clone(&rooms);
            handles.push(tokio::spawn(async move {
                let name = (worker % 4).to_string();
                for _ in 0..1_000 {
                    let room = rooms.get_room(&name);
                    rooms.check_room(room.name());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every room created during the stress run was empty, so every
        // check_room that saw it removed it.
        assert_eq!(rooms.len(), 0);
    }
}
