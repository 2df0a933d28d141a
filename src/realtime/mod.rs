mod event_router;
mod hub;
mod registry;
mod rooms;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use event_router::EventRouter;
pub use hub::Hub;
pub use registry::{ConnectionId, ConnectionRegistry, Outbox};
pub use rooms::{RoomId, RoomMembership};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::realtime_ws))
}
