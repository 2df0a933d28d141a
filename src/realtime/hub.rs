use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::events::ClientEvent;

use super::{event_router::EventRouter, registry::{ConnectionId, Outbox}};

enum HubCommand {
    Connect { connection_id: ConnectionId, outbox: Outbox },
    Event { connection_id: ConnectionId, event: ClientEvent },
    Disconnect { connection_id: ConnectionId },
}

/// Handle to the task that owns the [`EventRouter`].
///
/// Commands from every socket funnel into one queue, so room state is only
/// ever touched by one task and each connection's events keep their order.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    pub fn spawn() -> Hub {
        Hub::spawn_with(EventRouter::new())
    }

    pub fn spawn_with(router: EventRouter) -> Hub {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(router, rx));
        Hub { tx }
    }

    pub fn connect(&self, outbox: Outbox) -> ConnectionId {
        let connection_id = Uuid::now_v7();
        self.command(HubCommand::Connect { connection_id, outbox });
        connection_id
    }

    pub fn send(&self, connection_id: ConnectionId, event: ClientEvent) {
        self.command(HubCommand::Event { connection_id, event });
    }

    pub fn disconnect(&self, connection_id: ConnectionId) {
        self.command(HubCommand::Disconnect { connection_id });
    }

    fn command(&self, command: HubCommand) {
        if self.tx.send(command).is_err() {
            debug!("hub is gone, dropping command");
        }
    }
}

async fn run(mut router: EventRouter, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Connect { connection_id, outbox } => router.connect(connection_id, outbox),
            HubCommand::Event { connection_id, event } => router.dispatch(connection_id, event),
            HubCommand::Disconnect { connection_id } => router.unregister(connection_id),
        }
    }
    debug!("hub stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::events::ServerEvent;

    use super::*;

    #[tokio::test]
    async fn events_from_one_connection_keep_their_order() {
        let hub = Hub::spawn();

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let a = hub.connect(a_tx);
        let b = hub.connect(b_tx);

        hub.send(a, ClientEvent::Setup(json!({ "_id": "u1" })));
        hub.send(b, ClientEvent::Setup(json!({ "_id": "u2" })));
        assert_eq!(a_rx.recv().await, Some(ServerEvent::Connected));
        assert_eq!(b_rx.recv().await, Some(ServerEvent::Connected));

        hub.send(b, ClientEvent::JoinChat("chat1".into()));
        hub.send(a, ClientEvent::JoinChat("chat1".into()));
        for n in 0..5 {
            hub.send(a, ClientEvent::Typing("chat1".into(), json!({ "_id": "u1", "n": n })));
        }

        for n in 0..5 {
            assert_eq!(b_rx.recv().await, Some(ServerEvent::Typing(json!({ "_id": "u1", "n": n }))));
        }
    }

    #[tokio::test]
    async fn disconnect_stops_delivery() {
        let hub = Hub::spawn();

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let a = hub.connect(a_tx);
        let b = hub.connect(b_tx);
        hub.send(a, ClientEvent::Setup(json!({ "_id": "u1" })));
        hub.send(b, ClientEvent::Setup(json!({ "_id": "u2" })));
        assert_eq!(a_rx.recv().await, Some(ServerEvent::Connected));
        assert_eq!(b_rx.recv().await, Some(ServerEvent::Connected));

        hub.disconnect(b);
        hub.send(a, ClientEvent::NewMessage(json!({
            "sender": { "_id": "u1" },
            "chat": { "_id": "chat1", "users": [{ "_id": "u1" }, { "_id": "u2" }] },
        })));
        hub.send(a, ClientEvent::Setup(json!({ "_id": "u1" })));
        assert_eq!(a_rx.recv().await, Some(ServerEvent::Connected));

        // the router dropped b's outbox on disconnect
        assert_eq!(b_rx.recv().await, None);
    }
}
