use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;

pub type ConnectionId = Uuid;
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    outbox: Outbox,
    user_id: Option<String>,
}

/// Live connections and the identity each one announced.
///
/// Several connections may carry the same user id (tabs, devices); each is
/// tracked on its own.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn insert(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.connections.insert(connection_id, Connection { outbox, user_id: None });
    }

    /// Binds `user_id`, returning the identity it replaced.
    ///
    /// `None` when the connection is unknown.
    pub fn bind(&mut self, connection_id: ConnectionId, user_id: String) -> Option<Option<String>> {
        let connection = self.connections.get_mut(&connection_id)?;
        Some(connection.user_id.replace(user_id))
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Option<String>> {
        self.connections
            .remove(&connection_id)
            .map(|connection| connection.user_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.connections.get(&connection_id)?.user_id.as_deref()
    }

    /// Fire and forget. `false` when the connection is gone or its writer hung up.
    pub fn send(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|connection| connection.outbox.send(event).is_ok())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
