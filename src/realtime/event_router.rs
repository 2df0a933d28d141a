use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{events::{ClientEvent, ServerEvent}, AppResult, GetField};

use super::{registry::{ConnectionId, ConnectionRegistry, Outbox}, rooms::RoomMembership};

/// Owns all connection and room state and applies the fan-out rules.
///
/// Nothing else mutates membership; every change arrives as an event on one
/// connection.
#[derive(Default)]
pub struct EventRouter {
    registry: ConnectionRegistry,
    rooms: RoomMembership,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.registry.insert(connection_id, outbox);
        debug!(%connection_id, connections = self.registry.len(), "connection opened");
    }

    /// Binds the identity, joins its identity room and acks with `connected`.
    pub fn register(&mut self, connection_id: ConnectionId, user_id: String) {
        let Some(replaced) = self.registry.bind(connection_id, user_id.clone()) else {
            warn!(%connection_id, %user_id, "setup from unknown connection");
            return;
        };

        if let Some(previous) = replaced.filter(|previous| *previous != user_id) {
            info!(%connection_id, %previous, %user_id, "connection changed identity");
        }

        self.rooms.join_identity(connection_id, &user_id);
        info!(%connection_id, %user_id, "user is online");

        self.registry.send(connection_id, ServerEvent::Connected);
    }

    pub fn unregister(&mut self, connection_id: ConnectionId) {
        let user_id = self.registry.remove(connection_id).flatten();
        let left = self.rooms.remove_connection(connection_id);

        info!(%connection_id, ?user_id, rooms = left.len(), "connection closed");
    }

    pub fn dispatch(&mut self, connection_id: ConnectionId, event: ClientEvent) {
        if !self.registry.contains(connection_id) {
            warn!(%connection_id, event = event.name(), "event from unknown connection");
            return;
        }

        match event {
            ClientEvent::Setup(user) => match user.get_str_field("_id") {
                Ok(user_id) => self.register(connection_id, user_id),
                Err(err) => warn!(%connection_id, error = %err, "dropping malformed setup"),
            },
            ClientEvent::JoinChat(room_id) => {
                if let Some(previous) = self.rooms.join(connection_id, &room_id) {
                    info!(%connection_id, room = %previous, "user left room");
                }
                info!(%connection_id, room = %room_id, "user joined room");
            }
            ClientEvent::Typing(room_id, user) => {
                self.to_room(connection_id, &room_id, ServerEvent::Typing(user));
            }
            ClientEvent::StopTyping(room_id, user) => {
                self.to_room(connection_id, &room_id, ServerEvent::StopTyping(user));
            }
            ClientEvent::NewMessage(message) => self.new_message(connection_id, message),
        }
    }

    fn to_room(&self, sender: ConnectionId, room_id: &str, event: ServerEvent) {
        let members: Vec<ConnectionId> = self.rooms.members_of(room_id).collect();
        let delivered = self.fan_out(sender, members, &event);

        debug!(%sender, room = room_id, event = event.name(), delivered, "fan out");
    }

    fn new_message(&self, sender: ConnectionId, message: Value) {
        let recipients = match recipients_of(&message) {
            Ok(recipients) => recipients,
            Err(err) => {
                warn!(%sender, error = %err, "dropping new message without chat users");
                return;
            }
        };

        let mut targets = Vec::new();
        let mut seen = HashSet::new();
        for user_id in &recipients {
            for member in self.rooms.members_of(user_id) {
                if seen.insert(member) {
                    targets.push(member);
                }
            }
        }

        let delivered = self.fan_out(sender, targets, &ServerEvent::MessageReceived(message));
        debug!(%sender, recipients = recipients.len(), delivered, "message fan out");
    }

    /// Sends to every target but the emitting connection; a dead target never
    /// stops the others.
    fn fan_out(&self, sender: ConnectionId, targets: Vec<ConnectionId>, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for target in targets {
            if target == sender {
                continue;
            }
            if self.registry.send(target, event.clone()) {
                delivered += 1;
            } else {
                debug!(%target, event = event.name(), "recipient gone, skipping");
            }
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }
}

/// User ids of the message's chat, minus the sender. Fails as a whole if
/// anything needed to resolve them is missing.
fn recipients_of(message: &Value) -> AppResult<Vec<String>> {
    let sender_id = message.get_obj_field("sender")?.get_str_field("_id")?;
    let users = message.get_obj_field("chat")?.get_array_field("users")?;

    let user_ids = users
        .iter()
        .map(|user| user.get_str_field("_id"))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(user_ids.into_iter().filter(|user_id| *user_id != sender_id).collect())
}
