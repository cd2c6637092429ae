//! Session state machine
//!
//! One `Session` per accepted connection. `start` spawns the session's two
//! tasks: a reader that turns incoming lines into commands and enqueues
//! them, and a writer that drains the queue, mediates room membership, and
//! owns the transport for writing. `stop` is terminal: it aborts the
//! reader, detaches from the current room, and injects `Exit` so the
//! writer drains any backlog and then runs its cleanup path.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::command::{build_message, parse_command, sanitize, Command};
use crate::error::AppError;
use crate::line::{self, LineReader, LineWriter, READ_TIMEOUT};
use crate::room::Room;
use crate::room_set::RoomSet;
use crate::types::{Lifecycle, SessionId};

/// Notice sent back when input does not parse to a command
const INVALID_INPUT_NOTICE: &str = "Invalid input!";

/// Guidance sent back for Say/Who while not in a room
const NOT_IN_ROOM_NOTICE: &str = "You are not in a room! Join one with /enter <room>.";

/// Once-only notification fired after the writer task has drained
pub type StopCallback = Box<dyn FnOnce() + Send + 'static>;

/// Server-side state for one client connection
pub struct Session {
    id: SessionId,
    rooms: Arc<RoomSet>,
    queue_tx: mpsc::UnboundedSender<Command>,
    guard: Mutex<SessionGuard>,
    /// Handle to self, used to hand the spawned tasks and rooms an owning
    /// reference
    weak: Weak<Session>,
}

/// Mutable session state, all behind one lock (never held across an await)
struct SessionGuard {
    state: Lifecycle,
    room: Option<Arc<Room>>,
    reader: Option<JoinHandle<()>>,
    on_stop: Option<StopCallback>,
    startup: Option<Startup>,
}

/// Resources handed to the tasks at `start`
struct Startup {
    stream: TcpStream,
    queue_rx: mpsc::UnboundedReceiver<Command>,
}

impl Session {
    pub fn new(id: SessionId, stream: TcpStream, rooms: Arc<RoomSet>) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|weak| Self {
            id,
            rooms,
            queue_tx,
            guard: Mutex::new(SessionGuard {
                state: Lifecycle::NotStarted,
                room: None,
                reader: None,
                on_stop: None,
                startup: Some(Startup { stream, queue_rx }),
            }),
            weak: weak.clone(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> Lifecycle {
        self.guard.lock().state
    }

    /// Register the stop notification. The server uses this to remove the
    /// session from the manager and release its admission slot.
    pub fn set_on_stop(&self, callback: StopCallback) {
        self.guard.lock().on_stop = Some(callback);
    }

    /// Enqueue a command for the writer task (FIFO).
    ///
    /// Fails with an invalid-state error unless the session is started.
    pub fn send(&self, command: Command) -> Result<(), AppError> {
        let state = self.guard.lock().state;
        if state != Lifecycle::Started {
            return Err(AppError::invalid_state("send", state));
        }
        self.queue_tx
            .send(command)
            .map_err(|_| AppError::QueueClosed)
    }

    /// Spawn the reader and writer tasks. Valid exactly once.
    pub fn start(&self) -> Result<(), AppError> {
        let mut guard = self.guard.lock();
        if guard.state != Lifecycle::NotStarted {
            return Err(AppError::invalid_state("start", guard.state));
        }
        let Some(session) = self.weak.upgrade() else {
            return Err(AppError::invalid_state("start", guard.state));
        };
        let Some(Startup { stream, queue_rx }) = guard.startup.take() else {
            return Err(AppError::invalid_state("start", guard.state));
        };

        let (reader, writer) = line::split(stream);
        guard.state = Lifecycle::Started;
        guard.reader = Some(tokio::spawn(Arc::clone(&session).read_loop(reader)));
        tokio::spawn(session.write_loop(queue_rx, writer));

        debug!("Session {} started", self.id);
        Ok(())
    }

    /// Transition to `Stopped`, abort the reader, detach from the current
    /// room, and inject `Exit` so the writer terminates after draining any
    /// already-queued commands. Valid exactly once, after `start`.
    pub fn stop(&self) -> Result<(), AppError> {
        let (reader, room) = {
            let mut guard = self.guard.lock();
            if guard.state != Lifecycle::Started {
                return Err(AppError::invalid_state("stop", guard.state));
            }
            guard.state = Lifecycle::Stopped;
            (guard.reader.take(), guard.room.take())
        };

        if let Some(reader) = reader {
            reader.abort();
        }
        if let Some(room) = room {
            room.leave(self.id);
            self.rooms.check_room(room.name());
        }
        // Wakes the writer even if it is blocked on an empty queue; the
        // unbounded channel guarantees the Exit itself cannot block.
        let _ = self.queue_tx.send(Command::Exit);

        debug!("Session {} stopped", self.id);
        Ok(())
    }

    /// Reader task: line in, command enqueued.
    async fn read_loop(self: Arc<Self>, mut reader: LineReader) {
        loop {
            match line::read_line(&mut reader, READ_TIMEOUT).await {
                Ok(Some(raw)) => {
                    let text = sanitize(&raw);
                    let command = parse_command(&text)
                        .unwrap_or_else(|| Command::Hear(INVALID_INPUT_NOTICE.to_string()));
                    if self.send(command).is_err() {
                        // Stopped underneath us
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Session {}: inactivity timeout or disconnect", self.id);
                    break;
                }
                Err(e) => {
                    warn!("Session {}: read failed: {}", self.id, e);
                    break;
                }
            }
        }
        // Whatever ended the loop, signal the writer through the injected
        // Exit so it unwinds via its normal cleanup path.
        let _ = self.stop();
        debug!("Session {}: reader task ended", self.id);
    }

    /// Writer task: the single dispatch point for commands, and the only
    /// place that joins and leaves rooms.
    async fn write_loop(
        self: Arc<Self>,
        mut queue: mpsc::UnboundedReceiver<Command>,
        mut writer: LineWriter,
    ) {
        while let Some(command) = queue.recv().await {
            match Self::apply(&self, command, &mut writer).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    // Treated exactly like Exit: proceed to cleanup
                    error!("Session {}: writer error: {}", self.id, e);
                    break;
                }
            }
        }

        // Covers the client-initiated /exit path; a no-op error when the
        // session was stopped first.
        let _ = self.stop();
        // stop() already detached, but leaving is idempotent
        self.leave_current_room();

        let callback = self.guard.lock().on_stop.take();
        if let Some(callback) = callback {
            callback();
        }
        debug!("Session {}: writer task ended", self.id);
        // Dropping the writer releases the transport.
    }

    /// Process one command. Returns Ok(false) to end the writer loop.
    async fn apply(
        session: &Arc<Session>,
        command: Command,
        writer: &mut LineWriter,
    ) -> Result<bool, AppError> {
        match command {
            Command::Enter(room_name) => {
                let mut guard = session.guard.lock();
                // Already in a room: no-op
                if guard.room.is_none() {
                    // Lookup and join happen under the registry lock, so a
                    // racing last leaver cannot vacate the room in between.
                    let room = session.rooms.join_room(&room_name, Arc::clone(session));
                    guard.room = Some(room);
                    debug!("Session {} entered room '{}'", session.id, room_name);
                }
            }
            Command::Leave => {
                session.leave_current_room();
            }
            Command::Say(text) => {
                let room = session.guard.lock().room.clone();
                match room {
                    None => line::write_line(writer, NOT_IN_ROOM_NOTICE).await?,
                    Some(room) => {
                        let message = build_message(room.name(), &session.id.to_string(), &text);
                        room.post_from(session.id, &message);
                    }
                }
            }
            Command::Who => {
                let room = session.guard.lock().room.clone();
                match room {
                    None => line::write_line(writer, NOT_IN_ROOM_NOTICE).await?,
                    Some(room) => {
                        let names = room.player_names();
                        let header = format!("{} member(s) in {}", names.len(), room.name());
                        line::write_line(writer, &header).await?;
                        for name in names {
                            line::write_line(writer, &name).await?;
                        }
                    }
                }
            }
            Command::Hear(text) => {
                line::write_line(writer, &text).await?;
            }
            Command::Exit => return Ok(false),
        }
        Ok(true)
    }

    /// Leave the current room if any and vacate it if now empty.
    fn leave_current_room(&self) {
        let room = self.guard.lock().room.take();
        if let Some(room) = room {
            room.leave(self.id);
            self.rooms.check_room(room.name());
        }
    }
}
