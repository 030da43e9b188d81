//! Room broadcast engine for Parley.
//!
//! The engine orchestrates join/send/typing/leave, fans events out to the
//! right connection subset, and sequences history delivery. It is the
//! single Room-Server aggregate: the presence registry, typing tracker,
//! and per-connection event sinks live behind one mutex, so every
//! broadcast observes registry and tracker state *after* the triggering
//! mutation has been fully applied.
//!
//! Events are queued to per-connection unbounded channels while the lock
//! is held, which makes the per-room event order identical for every
//! member. The only suspension point (the durable flush after a send)
//! happens with the lock released.

use crate::presence::{ConnectionId, Registry};
use crate::typing::TypingTracker;
use parley_protocol::{ChatMessage, Member, ServerEvent};
use parley_store::MessageStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound event queue for one connection.
pub type EventSink = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Engine errors.
///
/// All of these are validation failures rejected before any state
/// mutation; none of them leaves partial side effects behind.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Message text is empty after trimming.
    #[error("Message text is empty")]
    EmptyMessage,

    /// Join is missing a display name or a room.
    #[error("Join requires a display name and a room")]
    InvalidJoin,

    /// The connection has not joined a room.
    #[error("Connection not in a room: {0}")]
    NotJoined(String),

    /// The connection id was never registered.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),
}

/// Shared mutable state, guarded by the engine mutex.
#[derive(Default)]
struct EngineState {
    /// Who is where. Single source of truth for membership.
    registry: Registry,
    /// Who is composing. Cleared on any membership change.
    typing: TypingTracker,
    /// Outbound queues, keyed like the registry.
    sinks: HashMap<ConnectionId, EventSink>,
}

impl EngineState {
    /// Queue an event for one connection. A closed sink means the session
    /// is tearing down; the disconnect transition will clean it up.
    fn send_to(&self, connection_id: &str, event: ServerEvent) {
        if let Some(sink) = self.sinks.get(connection_id) {
            let _ = sink.send(Arc::new(event));
        }
    }

    /// Queue an event for every member of a room, optionally skipping one
    /// connection.
    fn broadcast(&self, room: &str, event: ServerEvent, skip: Option<&str>) {
        let event = Arc::new(event);
        for id in self.registry.member_ids_of(room) {
            if skip == Some(id.as_str()) {
                continue;
            }
            if let Some(sink) = self.sinks.get(&id) {
                let _ = sink.send(Arc::clone(&event));
            }
        }
    }

    /// Fresh roster event for a room.
    fn roster_event(&self, room: &str) -> ServerEvent {
        ServerEvent::RoomData {
            room: room.to_string(),
            members: self
                .registry
                .members_of(room)
                .into_iter()
                .map(Member::new)
                .collect(),
        }
    }

    /// Current typing set event for a room.
    fn typing_event(&self, room: &str) -> ServerEvent {
        ServerEvent::TypingStatus {
            room: room.to_string(),
            typing: self.typing.typists_of(room),
        }
    }

    /// Shared room-exit path for leave/disconnect: typing cleanup plus the
    /// "has left" notice and refreshed roster for the remaining members.
    fn announce_departure(&mut self, name: &str, room: &str) {
        let typing_changed = self.typing.stop(room, name);
        let notice = ChatMessage::system(format!("{name} has left the room"), room);
        self.broadcast(room, ServerEvent::Message(notice), None);
        let roster = self.roster_event(room);
        self.broadcast(room, roster, None);
        if typing_changed {
            let event = self.typing_event(room);
            self.broadcast(room, event, None);
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Number of live connections.
    pub connections: usize,
    /// Number of rooms with at least one live member.
    pub active_rooms: usize,
    /// Number of rooms with at least one typist.
    pub typing_rooms: usize,
}

/// The room broadcast engine.
pub struct RoomEngine {
    /// All shared mutable state. Held only across non-blocking sections.
    state: Mutex<EngineState>,
    /// Durable message history.
    store: Arc<MessageStore>,
}

impl RoomEngine {
    /// Create an engine over a loaded message store.
    #[must_use]
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock poisoned")
    }

    /// The message store backing this engine.
    #[must_use]
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Engine statistics.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let state = self.lock();
        EngineStats {
            connections: state.registry.len(),
            active_rooms: state.registry.active_rooms().len(),
            typing_rooms: state.typing.tracked_rooms(),
        }
    }

    /// Register a new connection in the unjoined state.
    pub fn register(&self, connection_id: impl Into<ConnectionId>, sink: EventSink) {
        let connection_id = connection_id.into();
        let mut state = self.lock();
        state.registry.register(connection_id.clone());
        state.sinks.insert(connection_id, sink);
    }

    /// Put a connection into a room.
    ///
    /// Delivers the room's history, the current typing set, and the
    /// refreshed roster to the joiner; the other members get a join notice
    /// and the roster. A prior room, if different, gets its own refreshed
    /// roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or room is empty after trimming, or if
    /// the connection was never registered. Nothing is mutated on error.
    pub fn join(
        &self,
        connection_id: &str,
        display_name: &str,
        room: &str,
    ) -> Result<(), EngineError> {
        let name = display_name.trim();
        let room = room.trim();
        if name.is_empty() || room.is_empty() {
            return Err(EngineError::InvalidJoin);
        }

        let mut state = self.lock();
        if state.registry.get(connection_id).is_none() {
            return Err(EngineError::UnknownConnection(connection_id.to_string()));
        }

        let previous = state.registry.join(connection_id, name, room);

        // The old room lost a member: clear its typing entry and let the
        // remaining members see the refreshed roster.
        if let Some((old_name, old_room)) = previous {
            let typing_changed = state.typing.stop(&old_room, &old_name);
            if typing_changed {
                let event = state.typing_event(&old_room);
                state.broadcast(&old_room, event, None);
            }
            if old_room != room {
                let event = state.roster_event(&old_room);
                state.broadcast(&old_room, event, None);
            }
        }

        // History goes to the requesting connection only.
        state.send_to(
            connection_id,
            ServerEvent::ChatHistory {
                messages: self.store.history_of(room),
            },
        );

        // Join notice to the others, then the roster to everyone.
        let notice = ChatMessage::system(format!("{name} has joined the room"), room);
        state.broadcast(room, ServerEvent::Message(notice), Some(connection_id));
        let roster = state.roster_event(room);
        state.broadcast(room, roster, None);

        // Current typing set to the joiner only.
        let typing = state.typing_event(room);
        state.send_to(connection_id, typing);

        debug!(connection = %connection_id, name = %name, room = %room, "Join complete");
        Ok(())
    }

    /// Accept a message from a connection and broadcast it to its room.
    ///
    /// The sender receives its own message from the broadcast like everyone
    /// else, so all members observe one consistent ordering. The durable
    /// flush happens after the broadcast, outside the engine lock, and is
    /// best-effort: a flush failure is logged, never surfaced to the room.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is empty after trimming or the
    /// connection has not joined a room. Nothing is mutated or persisted
    /// on error.
    pub async fn send(&self, connection_id: &str, text: &str) -> Result<(), EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        {
            let mut state = self.lock();
            let (name, room) = state
                .registry
                .get(connection_id)
                .and_then(|r| r.membership())
                .map(|(n, r)| (n.to_string(), r.to_string()))
                .ok_or_else(|| EngineError::NotJoined(connection_id.to_string()))?;

            // Sending implies the author stopped typing.
            if state.typing.stop(&room, &name) {
                let event = state.typing_event(&room);
                state.broadcast(&room, event, None);
            }

            let message = ChatMessage::new(name, text, room.clone());
            self.store.append(message.clone());
            state.broadcast(&room, ServerEvent::Message(message), None);
            debug!(connection = %connection_id, room = %room, "Message accepted");
        }

        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "Failed to flush message log");
        }
        Ok(())
    }

    /// Mark the connection's name as typing in its room and broadcast the
    /// updated set to all members, typist included.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has not joined a room.
    pub fn typing(&self, connection_id: &str) -> Result<(), EngineError> {
        self.set_typing(connection_id, true)
    }

    /// Remove the connection's name from its room's typing set and
    /// broadcast the updated set.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has not joined a room.
    pub fn stop_typing(&self, connection_id: &str) -> Result<(), EngineError> {
        self.set_typing(connection_id, false)
    }

    fn set_typing(&self, connection_id: &str, is_typing: bool) -> Result<(), EngineError> {
        let mut state = self.lock();
        let (name, room) = state
            .registry
            .get(connection_id)
            .and_then(|r| r.membership())
            .map(|(n, r)| (n.to_string(), r.to_string()))
            .ok_or_else(|| EngineError::NotJoined(connection_id.to_string()))?;

        if is_typing {
            state.typing.start(&room, &name);
        } else {
            state.typing.stop(&room, &name);
        }

        let event = state.typing_event(&room);
        state.broadcast(&room, event, None);
        Ok(())
    }

    /// Explicitly leave the current room without disconnecting.
    ///
    /// The connection returns to the unjoined state, ready for a new join.
    /// No-op if the connection is unknown or not in a room.
    pub fn leave_room(&self, connection_id: &str) {
        let mut state = self.lock();
        if let Some((name, room)) = state.registry.clear_membership(connection_id) {
            state.announce_departure(&name, &room);
            debug!(connection = %connection_id, room = %room, "Left room");
        }
    }

    /// Tear down a connection.
    ///
    /// Removes the registry record and event sink, clears typing state,
    /// and notifies the remaining members of its room. Idempotent: the
    /// record is gone after the first call, so repeated disconnects are
    /// no-ops and the "has left" notice fires exactly once.
    pub fn disconnect(&self, connection_id: &str) {
        let mut state = self.lock();
        state.sinks.remove(connection_id);
        let Some(record) = state.registry.leave(connection_id) else {
            return;
        };
        if let Some((name, room)) = record.membership() {
            let (name, room) = (name.to_string(), room.to_string());
            state.announce_departure(&name, &room);
        }
        debug!(connection = %connection_id, "Disconnect complete");
    }
}
