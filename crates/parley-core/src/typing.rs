//! Typing state tracking for Parley.
//!
//! Tracks, per room, the set of display names currently composing a
//! message. The state is ephemeral: never persisted, and dropped for a
//! room as soon as its set becomes empty.

use std::collections::{BTreeSet, HashMap};
use tracing::trace;

/// Per-room sets of names currently typing.
///
/// Entries are removed on stop-typing, send, room change, or disconnect;
/// the engine enforces that every tracked name is a current member of the
/// room by clearing on any membership change.
#[derive(Debug, Default)]
pub struct TypingTracker {
    /// Room name to set of typing display names.
    rooms: HashMap<String, BTreeSet<String>>,
}

impl TypingTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a name as typing in a room.
    ///
    /// Returns `true` if the set changed.
    pub fn start(&mut self, room: &str, name: &str) -> bool {
        let changed = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(name.to_string());
        if changed {
            trace!(room = %room, name = %name, "Started typing");
        }
        changed
    }

    /// Remove a name from a room's typing set.
    ///
    /// Safe no-op if the name or the room entry is absent. An emptied set
    /// drops the room entry so idle rooms hold no memory. Returns `true`
    /// if the set changed.
    pub fn stop(&mut self, room: &str, name: &str) -> bool {
        let Some(set) = self.rooms.get_mut(room) else {
            return false;
        };
        let changed = set.remove(name);
        if set.is_empty() {
            self.rooms.remove(room);
        }
        if changed {
            trace!(room = %room, name = %name, "Stopped typing");
        }
        changed
    }

    /// Names currently typing in a room, sorted for stable broadcasts.
    #[must_use]
    pub fn typists_of(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one typist.
    #[must_use]
    pub fn tracked_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop() {
        let mut tracker = TypingTracker::new();

        assert!(tracker.start("general", "Alice"));
        assert!(!tracker.start("general", "Alice"));
        assert_eq!(tracker.typists_of("general"), vec!["Alice".to_string()]);

        assert!(tracker.stop("general", "Alice"));
        assert!(tracker.typists_of("general").is_empty());
    }

    #[test]
    fn test_stop_on_untracked_room_is_noop() {
        let mut tracker = TypingTracker::new();
        assert!(!tracker.stop("ghost-room", "Alice"));
    }

    #[test]
    fn test_stop_absent_name_is_noop() {
        let mut tracker = TypingTracker::new();
        tracker.start("general", "Alice");
        assert!(!tracker.stop("general", "Bob"));
        assert_eq!(tracker.typists_of("general"), vec!["Alice".to_string()]);
    }

    #[test]
    fn test_empty_set_drops_room_entry() {
        let mut tracker = TypingTracker::new();
        tracker.start("general", "Alice");
        assert_eq!(tracker.tracked_rooms(), 1);

        tracker.stop("general", "Alice");
        assert_eq!(tracker.tracked_rooms(), 0);
    }

    #[test]
    fn test_rooms_are_independent() {
        let mut tracker = TypingTracker::new();
        tracker.start("general", "Alice");
        tracker.start("random", "Bob");

        assert_eq!(tracker.typists_of("general"), vec!["Alice".to_string()]);
        assert_eq!(tracker.typists_of("random"), vec!["Bob".to_string()]);
    }

    #[test]
    fn test_typists_sorted() {
        let mut tracker = TypingTracker::new();
        tracker.start("general", "Carol");
        tracker.start("general", "Alice");
        tracker.start("general", "Bob");

        assert_eq!(
            tracker.typists_of("general"),
            vec!["Alice".to_string(), "Bob".to_string(), "Carol".to_string()]
        );
    }
}
