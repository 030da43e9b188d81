//! Presence registry for Parley.
//!
//! The registry is the single source of truth for which connection is in
//! which room. Rosters are always derived from it on demand, never cached
//! by other components.

use std::collections::HashMap;
use tracing::debug;

/// Opaque identity of one live transport session.
pub type ConnectionId = String;

/// Per-connection record owned by the registry.
///
/// A freshly registered connection has neither a name nor a room
/// (the `Unjoined` state); both are set by the first join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Display name chosen at join. Duplicates across connections are allowed.
    pub display_name: Option<String>,
    /// Room the connection currently belongs to.
    pub room: Option<String>,
}

impl ConnectionRecord {
    /// The (name, room) pair if the connection has joined a room.
    #[must_use]
    pub fn membership(&self) -> Option<(&str, &str)> {
        match (&self.display_name, &self.room) {
            (Some(name), Some(room)) => Some((name.as_str(), room.as_str())),
            _ => None,
        }
    }
}

/// Tracks every live connection and its room membership.
///
/// All mutation is serialized by the engine's critical section; the
/// registry itself exposes no locks.
#[derive(Debug, Default)]
pub struct Registry {
    /// Connection records indexed by connection id.
    connections: HashMap<ConnectionId, ConnectionRecord>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if there are no live connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a connection with no name or room.
    ///
    /// Returns `true` if this is a new connection; registering an existing
    /// id is a no-op.
    pub fn register(&mut self, connection_id: impl Into<ConnectionId>) -> bool {
        let conn_id = connection_id.into();
        let is_new = !self.connections.contains_key(&conn_id);
        if is_new {
            self.connections.insert(conn_id.clone(), ConnectionRecord::default());
            debug!(connection = %conn_id, "Connection registered");
        }
        is_new
    }

    /// Get the record for a connection.
    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&ConnectionRecord> {
        self.connections.get(connection_id)
    }

    /// Put a connection into a room under a display name.
    ///
    /// A connection belongs to at most one room, so any prior membership is
    /// replaced in the same step. Returns the previous (name, room) pair if
    /// the connection had joined before, or `None` for a first join.
    ///
    /// Unknown connection ids are ignored and return `None`; callers
    /// register connections before routing joins to them.
    pub fn join(
        &mut self,
        connection_id: &str,
        display_name: impl Into<String>,
        room: impl Into<String>,
    ) -> Option<(String, String)> {
        let record = self.connections.get_mut(connection_id)?;
        let previous = match (record.display_name.take(), record.room.take()) {
            (Some(name), Some(room)) => Some((name, room)),
            _ => None,
        };

        let name = display_name.into();
        let room = room.into();
        debug!(connection = %connection_id, name = %name, room = %room, "Joined room");

        record.display_name = Some(name);
        record.room = Some(room);
        previous
    }

    /// Clear a connection's membership, returning it to the unjoined state.
    ///
    /// Returns the (name, room) pair it held, if any.
    pub fn clear_membership(&mut self, connection_id: &str) -> Option<(String, String)> {
        let record = self.connections.get_mut(connection_id)?;
        match (record.display_name.take(), record.room.take()) {
            (Some(name), Some(room)) => {
                debug!(connection = %connection_id, room = %room, "Left room");
                Some((name, room))
            }
            _ => None,
        }
    }

    /// Delete a connection record entirely.
    ///
    /// Safe no-op for unknown ids. Returns the removed record, if any.
    pub fn leave(&mut self, connection_id: &str) -> Option<ConnectionRecord> {
        let record = self.connections.remove(connection_id);
        if record.is_some() {
            debug!(connection = %connection_id, "Connection removed");
        }
        record
    }

    /// The roster of a room: display names of every connection currently in
    /// it. Order-independent; duplicate names are allowed.
    #[must_use]
    pub fn members_of(&self, room: &str) -> Vec<String> {
        self.connections
            .values()
            .filter_map(|record| match record.membership() {
                Some((name, r)) if r == room => Some(name.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Connection ids of every member of a room.
    #[must_use]
    pub fn member_ids_of(&self, room: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, r)| r.room.as_deref() == Some(room))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Names of the distinct rooms that currently have live members.
    #[must_use]
    pub fn active_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .connections
            .values()
            .filter_map(|r| r.room.clone())
            .collect();
        rooms.sort();
        rooms.dedup();
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = Registry::new();

        assert!(registry.register("conn-1"));
        assert!(!registry.register("conn-1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("conn-1"), Some(&ConnectionRecord::default()));
    }

    #[test]
    fn test_join_sets_membership() {
        let mut registry = Registry::new();
        registry.register("conn-1");

        let previous = registry.join("conn-1", "Alice", "general");
        assert_eq!(previous, None);
        assert_eq!(registry.members_of("general"), vec!["Alice".to_string()]);
    }

    #[test]
    fn test_rejoin_moves_between_rooms() {
        let mut registry = Registry::new();
        registry.register("conn-1");
        registry.join("conn-1", "Alice", "general");

        let previous = registry.join("conn-1", "Alice", "random");
        assert_eq!(
            previous,
            Some(("Alice".to_string(), "general".to_string()))
        );
        // No connection belongs to two rooms simultaneously.
        assert!(registry.members_of("general").is_empty());
        assert_eq!(registry.members_of("random"), vec!["Alice".to_string()]);
    }

    #[test]
    fn test_duplicate_display_names_allowed() {
        let mut registry = Registry::new();
        registry.register("conn-1");
        registry.register("conn-2");
        registry.join("conn-1", "Alice", "general");
        registry.join("conn-2", "Alice", "general");

        assert_eq!(registry.members_of("general").len(), 2);
    }

    #[test]
    fn test_leave_unknown_is_noop() {
        let mut registry = Registry::new();
        assert!(registry.leave("ghost").is_none());
    }

    #[test]
    fn test_leave_removes_from_roster() {
        let mut registry = Registry::new();
        registry.register("conn-1");
        registry.register("conn-2");
        registry.join("conn-1", "Alice", "general");
        registry.join("conn-2", "Bob", "general");

        registry.leave("conn-1");
        assert_eq!(registry.members_of("general"), vec!["Bob".to_string()]);
        assert!(registry.get("conn-1").is_none());
    }

    #[test]
    fn test_clear_membership_keeps_connection() {
        let mut registry = Registry::new();
        registry.register("conn-1");
        registry.join("conn-1", "Alice", "general");

        let cleared = registry.clear_membership("conn-1");
        assert_eq!(cleared, Some(("Alice".to_string(), "general".to_string())));
        assert!(registry.members_of("general").is_empty());
        // Still registered, back in the unjoined state.
        assert_eq!(registry.get("conn-1"), Some(&ConnectionRecord::default()));
    }

    #[test]
    fn test_active_rooms() {
        let mut registry = Registry::new();
        registry.register("conn-1");
        registry.register("conn-2");
        registry.register("conn-3");
        registry.join("conn-1", "Alice", "general");
        registry.join("conn-2", "Bob", "general");
        registry.join("conn-3", "Carol", "random");

        assert_eq!(
            registry.active_rooms(),
            vec!["general".to_string(), "random".to_string()]
        );
    }
}
