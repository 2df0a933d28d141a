//! Consuming side of the realtime socket.
//!
//! [`PresenceSession`] holds the state machine; [`PresenceClient`] runs it
//! over a websocket, talking to a [`ChatStore`] for history and sends.

mod session;
mod store;
mod typing;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle, time::Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::{events::{ClientEvent, ServerEvent}, models::Chat, AppResult};

pub use session::{PresenceSession, SessionChange, TypingState};
pub use store::{ChatStore, HttpChatStore};
pub use typing::{TypingDebouncer, TYPING_QUIET_PERIOD};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = futures_util::stream::SplitSink<Socket, WsMessage>;

enum Command {
    OpenChat(Chat),
    Keystroke,
    Send(String),
    DismissNotification(String),
}

pub struct PresenceClient {
    commands: mpsc::UnboundedSender<Command>,
    updates: mpsc::UnboundedReceiver<SessionChange>,
    task: JoinHandle<()>,
}

impl PresenceClient {
    /// Opens the socket and announces the session's identity.
    pub async fn connect(url: &str, session: PresenceSession, store: Arc<dyn ChatStore>) -> AppResult<PresenceClient> {
        let (socket, _) = connect_async(url).await?;
        let (mut sink, stream) = socket.split();

        emit(&mut sink, session.setup()).await?;

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(session, store, sink, stream, commands_rx, updates_tx));

        Ok(PresenceClient { commands, updates, task })
    }

    pub fn open_chat(&self, chat: Chat) {
        self.command(Command::OpenChat(chat));
    }

    pub fn keystroke(&self) {
        self.command(Command::Keystroke);
    }

    pub fn send(&self, content: impl Into<String>) {
        self.command(Command::Send(content.into()));
    }

    pub fn dismiss_notification(&self, message_id: impl Into<String>) {
        self.command(Command::DismissNotification(message_id.into()));
    }

    /// `None` once the connection is gone.
    pub async fn next_update(&mut self) -> Option<SessionChange> {
        self.updates.recv().await
    }

    pub fn close(self) {
        self.task.abort();
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("presence client stopped, dropping command");
        }
    }
}

async fn drive(
    mut session: PresenceSession,
    store: Arc<dyn ChatStore>,
    mut sink: Sink,
    mut stream: futures_util::stream::SplitStream<Socket>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedSender<SessionChange>,
) {
    loop {
        let deadline = session.typing_deadline();

        let result = tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(error = %err, "socket error");
                        break;
                    }
                };
                let Ok(event) = ServerEvent::decode(text.as_str()).inspect_err(|err| {
                    debug!(error = %err, "dropping malformed frame");
                }) else {
                    continue
                };
                if let Some(change) = session.on_event(event) {
                    let notified = matches!(change, SessionChange::Notified(_));
                    publish(&updates, change);
                    if notified {
                        publish(&updates, session.notifications_changed());
                    }
                }
                Ok(())
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(&mut session, store.as_ref(), &mut sink, &updates, command).await
            }
            _ = sleep_until(deadline) => {
                match session.poll_typing(Instant::now()) {
                    Some(event) => emit(&mut sink, event).await,
                    None => Ok(()),
                }
            }
        };

        if let Err(err) = result {
            warn!(error = %err, "socket write failed");
            break;
        }
    }

    debug!("presence session ended");
}

async fn handle_command(
    session: &mut PresenceSession,
    store: &dyn ChatStore,
    sink: &mut Sink,
    updates: &mpsc::UnboundedSender<SessionChange>,
    command: Command,
) -> AppResult<()> {
    match command {
        Command::OpenChat(chat) => {
            let chat_id = chat.id.clone();
            for event in session.open_chat(chat) {
                emit(sink, event).await?;
            }

            match store.fetch_messages(&chat_id).await {
                Ok(history) => {
                    if session.history_loaded(&chat_id, history) {
                        publish(updates, SessionChange::HistoryLoaded(session.messages().to_vec()));
                    }
                }
                Err(err) => {
                    warn!(%chat_id, error = %err, "failed to load messages");
                    publish(updates, SessionChange::Failed("Failed to Load the Messages".to_owned()));
                }
            }
        }
        Command::Keystroke => {
            if let Some(event) = session.keystroke(Instant::now()) {
                emit(sink, event).await?;
            }
        }
        Command::Send(content) => {
            let Some(chat_id) = session.active_chat_id().map(str::to_owned) else {
                return Ok(());
            };
            if content.is_empty() {
                return Ok(());
            }
            if let Some(event) = session.begin_send() {
                emit(sink, event).await?;
            }

            // must be stored before it is announced
            match store.send_message(&chat_id, &content).await {
                Ok(message) => {
                    let event = session.message_sent(message.clone());
                    emit(sink, event).await?;
                    publish(updates, SessionChange::Appended(message));
                }
                Err(err) => {
                    warn!(%chat_id, error = %err, "failed to send message");
                    publish(updates, SessionChange::Failed("Failed to send the Message".to_owned()));
                }
            }
        }
        Command::DismissNotification(message_id) => {
            if session.remove_notification(&message_id) {
                publish(updates, session.notifications_changed());
            }
        }
    }

    Ok(())
}

fn publish(updates: &mpsc::UnboundedSender<SessionChange>, change: SessionChange) {
    if updates.send(change).is_err() {
        debug!("presence client dropped, discarding update");
    }
}

async fn emit(sink: &mut Sink, event: ClientEvent) -> AppResult<()> {
    sink.send(WsMessage::Text(event.encode()?.into())).await?;
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
