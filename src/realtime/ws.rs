use std::sync::Arc;

use axum::{body::Bytes, debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, info, warn};

use crate::{auth::{self, TokenVerifier}, events::ClientEvent, Config};

use super::Hub;

#[debug_handler(state = crate::AppState)]
pub async fn realtime_ws(
    State(hub): State<Hub>,
    State(config): State<Arc<Config>>,
    State(verifier): State<Option<Arc<dyn TokenVerifier>>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| serve_socket(stream, hub, config, verifier).await)
}

async fn serve_socket(
    stream: WebSocket,
    hub: Hub,
    config: Arc<Config>,
    verifier: Option<Arc<dyn TokenVerifier>>,
) {
    let (outbox, mut rx) = mpsc::unbounded_channel();
    let connection_id = hub.connect(outbox);
    info!(%connection_id, "connected to realtime socket");

    let (mut sender, mut receiver) = stream.split();

    let ping_interval = config.ping_interval;
    let mut forward_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match event.encode() {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(%connection_id, error = %err, "failed to encode event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        let frame = tokio::select! {
            frame = timeout(config.ping_timeout, receiver.next()) => frame,
            _ = &mut forward_task => break,
        };

        let msg = match frame {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(err))) => {
                debug!(%connection_id, error = %err, "socket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!(%connection_id, "ping timeout");
                break;
            }
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let Ok(event) = ClientEvent::decode(text.as_str()).inspect_err(|err| {
            debug!(%connection_id, error = %err, "dropping malformed frame");
        }) else {
            continue
        };

        let event = match (event, &verifier) {
            (ClientEvent::Setup(user), Some(verifier)) => {
                // counts against the same silence budget as a read
                match timeout(config.ping_timeout, auth::verify_setup(verifier.as_ref(), &user)).await {
                    Ok(Ok(())) => ClientEvent::Setup(user),
                    Ok(Err(err)) => {
                        warn!(%connection_id, error = %err, "rejecting unverified setup");
                        continue;
                    }
                    Err(_) => {
                        warn!(%connection_id, "setup verification timed out");
                        continue;
                    }
                }
            }
            (event, _) => event,
        };

        hub.send(connection_id, event);
    }

    forward_task.abort();
    hub.disconnect(connection_id);
}
