use std::collections::{HashMap, HashSet};

use super::registry::ConnectionId;

pub type RoomId = String;

/// Room member sets plus, per connection, its permanent identity room and
/// the one conversation room it currently has open.
#[derive(Default)]
pub struct RoomMembership {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    identity: HashMap<ConnectionId, RoomId>,
    active: HashMap<ConnectionId, RoomId>,
}

impl RoomMembership {
    /// Returns the identity room this replaced, if any.
    pub fn join_identity(&mut self, connection_id: ConnectionId, user_id: &str) -> Option<RoomId> {
        let previous = self.identity.insert(connection_id, user_id.to_owned());
        self.add(connection_id, user_id);

        match previous {
            Some(previous) if previous != user_id => {
                self.release(connection_id, &previous);
                Some(previous)
            }
            _ => None,
        }
    }

    /// Makes `room_id` the active conversation, returning the room it left.
    pub fn join(&mut self, connection_id: ConnectionId, room_id: &str) -> Option<RoomId> {
        let previous = self.active.insert(connection_id, room_id.to_owned());
        self.add(connection_id, room_id);

        match previous {
            Some(previous) if previous != room_id => {
                self.release(connection_id, &previous);
                Some(previous)
            }
            _ => None,
        }
    }

    /// Leaves the active conversation if it is `room_id`. The identity room
    /// is only left on disconnect.
    pub fn leave(&mut self, connection_id: ConnectionId, room_id: &str) {
        if self.active.get(&connection_id).is_some_and(|active| active == room_id) {
            self.active.remove(&connection_id);
            self.release(connection_id, room_id);
        }
    }

    /// Drops every membership of the connection, returning the rooms it left.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Vec<RoomId> {
        let mut left: Vec<RoomId> = self
            .identity
            .remove(&connection_id)
            .into_iter()
            .chain(self.active.remove(&connection_id))
            .collect();
        left.dedup();

        for room_id in &left {
            self.release(connection_id, room_id);
        }

        left
    }

    pub fn active_room(&self, connection_id: ConnectionId) -> Option<&str> {
        self.active.get(&connection_id).map(String::as_str)
    }

    pub fn identity_room(&self, connection_id: ConnectionId) -> Option<&str> {
        self.identity.get(&connection_id).map(String::as_str)
    }

    pub(crate) fn members_of(&self, room_id: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room_id).into_iter().flatten().copied()
    }

    pub(crate) fn is_member(&self, room_id: &str, connection_id: ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|members| members.contains(&connection_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn add(&mut self, connection_id: ConnectionId, room_id: &str) {
        self.rooms
            .entry(room_id.to_owned())
            .or_default()
            .insert(connection_id);
    }

    // a user may open their own id as a conversation, so a room can be
    // held through both pointers at once
    fn release(&mut self, connection_id: ConnectionId, room_id: &str) {
        let still_held = self.identity.get(&connection_id).is_some_and(|r| r == room_id)
            || self.active.get(&connection_id).is_some_and(|r| r == room_id);
        if still_held {
            return;
        }

        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}
