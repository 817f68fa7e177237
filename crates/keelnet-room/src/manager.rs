//! The matchmaker: places logged-in users into rooms.
//!
//! # Concurrency
//!
//! Every mutation runs under ONE lock covering both the room list and the
//! directory. That keeps "user is in room R" and "R lists the user" in
//! step without any double-checked lookups. Per-room locks would need that
//! argument re-derived; at a hundred users per room the single lock is
//! nowhere near contended.
//!
//! The lock is never held while calling out. [`MatchMaker::enter_user`]
//! returns the room number and the caller sends the notification
//! afterwards.

use parking_lot::Mutex;

use keelnet_protocol::{RoomNumber, UserId};

use crate::{Room, RoomConfig, RoomDirectory, RoomError, RoomSummary};

struct Inner {
    /// Creation order. Room `n` lives at index `n - 1`.
    rooms: Vec<Room>,
    directory: RoomDirectory,
    last_room_number: i32,
}

impl Inner {
    fn room_mut(&mut self, number: RoomNumber) -> Option<&mut Room> {
        let index = usize::try_from(number.0).ok()?.checked_sub(1)?;
        self.rooms.get_mut(index)
    }

    fn room(&self, number: RoomNumber) -> Option<&Room> {
        let index = usize::try_from(number.0).ok()?.checked_sub(1)?;
        self.rooms.get(index)
    }
}

/// Assigns users to capacity-bounded rooms, first fit in creation order.
pub struct MatchMaker {
    config: RoomConfig,
    inner: Mutex<Inner>,
}

impl MatchMaker {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                rooms: Vec::new(),
                directory: RoomDirectory::default(),
                last_room_number: 0,
            }),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Puts `user` in the first room with space, creating a room if all
    /// are full. Returns the room number to notify the user with.
    ///
    /// # Errors
    /// [`RoomError::AlreadyInRoom`] if the user already has a room.
    pub fn enter_user(&self, user: UserId) -> Result<RoomNumber, RoomError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(current) = inner.directory.get(user) {
            return Err(RoomError::AlreadyInRoom(user, current));
        }

        let number = match inner.rooms.iter_mut().find(|r| r.has_space()) {
            Some(room) => {
                room.add(user);
                room.number()
            }
            None => {
                inner.last_room_number += 1;
                let number = RoomNumber(inner.last_room_number);
                let mut room = Room::new(number, self.config.capacity);
                room.add(user);
                inner.rooms.push(room);
                tracing::info!(room = %number, capacity = self.config.capacity, "room created");
                number
            }
        };
        inner.directory.insert(user, number);

        tracing::info!(%user, room = %number, "user entered room");
        Ok(number)
    }

    /// Takes `user` out of their room. The room itself stays.
    ///
    /// # Errors
    /// [`RoomError::NotInAnyRoom`] if the directory has no entry for the
    /// user.
    pub fn exit_user(&self, user: UserId) -> Result<RoomNumber, RoomError> {
        let mut inner = self.inner.lock();

        let number = inner
            .directory
            .remove(user)
            .ok_or(RoomError::NotInAnyRoom(user))?;
        if let Some(room) = inner.room_mut(number) {
            room.remove(user);
        }

        tracing::info!(%user, room = %number, "user left room");
        Ok(number)
    }

    pub fn room_of(&self, user: UserId) -> Option<RoomNumber> {
        self.inner.lock().directory.get(user)
    }

    /// Members of room `number`, or `None` if no such room was created.
    pub fn room_members(&self, number: RoomNumber) -> Option<Vec<UserId>> {
        self.inner
            .lock()
            .room(number)
            .map(|r| r.members().to_vec())
    }

    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Users currently placed in any room.
    pub fn user_count(&self) -> usize {
        self.inner.lock().directory.len()
    }

    /// Snapshot of every room in creation order.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.inner.lock().rooms.iter().map(Room::summary).collect()
    }

    /// Checks that directory and rooms agree and no room is over capacity.
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let inner = self.inner.lock();

        let mut placed = 0;
        for room in &inner.rooms {
            if room.len() > self.config.capacity {
                return Err(format!("room {} holds {} users", room.number(), room.len()));
            }
            for &user in room.members() {
                placed += 1;
                if inner.directory.get(user) != Some(room.number()) {
                    return Err(format!("{user} in room {} but not in directory", room.number()));
                }
            }
        }
        if placed != inner.directory.len() {
            return Err(format!(
                "{placed} users in rooms, {} in directory",
                inner.directory.len()
            ));
        }
        Ok(())
    }
}

impl Default for MatchMaker {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
