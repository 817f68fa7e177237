//! Rooms and the user → room directory.

use std::collections::HashMap;

use keelnet_protocol::{RoomNumber, UserId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A bounded group of users.
///
/// Rooms are never destroyed. An emptied room stays in place and takes
/// new users again once the matchmaker's scan reaches it.
#[derive(Debug, Clone)]
pub struct Room {
    number: RoomNumber,
    capacity: usize,
    members: Vec<UserId>,
}

impl Room {
    pub fn new(number: RoomNumber, capacity: usize) -> Self {
        Self {
            number,
            capacity,
            members: Vec::with_capacity(capacity),
        }
    }

    pub fn number(&self) -> RoomNumber {
        self.number
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_space(&self) -> bool {
        self.members.len() < self.capacity
    }

    /// Adds `user`. Returns `false` if the room is full.
    pub(crate) fn add(&mut self, user: UserId) -> bool {
        if !self.has_space() {
            return false;
        }
        self.members.push(user);
        true
    }

    /// Removes `user`. Returns `false` if they were not a member.
    pub(crate) fn remove(&mut self, user: UserId) -> bool {
        match self.members.iter().position(|&m| m == user) {
            Some(i) => {
                self.members.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            number: self.number,
            members: self.members.len(),
            capacity: self.capacity,
        }
    }
}

/// Point-in-time view of one room, for status pages and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub number: RoomNumber,
    pub members: usize,
    pub capacity: usize,
}

// ---------------------------------------------------------------------------
// RoomDirectory
// ---------------------------------------------------------------------------

/// Which room each user is in. At most one entry per user.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    entries: HashMap<UserId, RoomNumber>,
}

impl RoomDirectory {
    pub fn get(&self, user: UserId) -> Option<RoomNumber> {
        self.entries.get(&user).copied()
    }

    pub(crate) fn insert(&mut self, user: UserId, room: RoomNumber) {
        self.entries.insert(user, room);
    }

    pub(crate) fn remove(&mut self, user: UserId) -> Option<RoomNumber> {
        self.entries.remove(&user)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, RoomNumber)> + '_ {
        self.entries.iter().map(|(&u, &r)| (u, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_refuses_when_full() {
        let mut room = Room::new(RoomNumber(1), 2);
        assert!(room.add(UserId(1)));
        assert!(room.add(UserId(2)));
        assert!(!room.add(UserId(3)));
        assert_eq!(room.len(), 2);
        assert!(!room.has_space());
    }

    #[test]
    fn test_remove_member_frees_slot() {
        let mut room = Room::new(RoomNumber(1), 1);
        room.add(UserId(1));
        assert!(room.remove(UserId(1)));
        assert!(!room.remove(UserId(1)));
        assert!(room.is_empty());
        assert!(room.has_space());
    }

    #[test]
    fn test_summary_reflects_members() {
        let mut room = Room::new(RoomNumber(4), 100);
        room.add(UserId(1));
        assert_eq!(
            room.summary(),
            RoomSummary {
                number: RoomNumber(4),
                members: 1,
                capacity: 100,
            }
        );
    }

    #[test]
    fn test_directory_one_entry_per_user() {
        let mut dir = RoomDirectory::default();
        dir.insert(UserId(1), RoomNumber(1));
        dir.insert(UserId(1), RoomNumber(2));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(UserId(1)), Some(RoomNumber(2)));
        assert_eq!(dir.remove(UserId(1)), Some(RoomNumber(2)));
        assert!(dir.is_empty());
    }
}
