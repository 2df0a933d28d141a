use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::{events::{ClientEvent, ServerEvent}, models::{Chat, Message, UserRef}};

use super::typing::TypingDebouncer;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    Connected,
    HistoryLoaded(Vec<Message>),
    Appended(Message),
    /// A message for a chat that is not open.
    Notified(Message),
    /// The pending notifications, newest first, and whether the chat list
    /// should be fetched again.
    NotificationsChanged { notifications: Vec<Message>, refresh: bool },
    TypingChanged(Vec<UserRef>),
    /// A collaborator call failed; carries a message fit for the user.
    Failed(String),
}

/// Users currently typing in the open chat, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct TypingState {
    users: Vec<UserRef>,
}

impl TypingState {
    pub fn insert(&mut self, user: UserRef) -> bool {
        if self.users.iter().any(|u| u.id == user.id) {
            return false;
        }
        self.users.push(user);
        true
    }

    pub fn remove(&mut self, user_id: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.id != user_id);
        self.users.len() != before
    }

    pub fn clear(&mut self) -> bool {
        let had_any = !self.users.is_empty();
        self.users.clear();
        had_any
    }

    pub fn users(&self) -> &[UserRef] {
        &self.users
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Client side of one realtime connection, free of any I/O.
///
/// Inputs are server events and user actions; outputs are the client events
/// to put on the wire and [`SessionChange`]s for whatever renders the chat.
#[derive(Debug)]
pub struct PresenceSession {
    user: UserRef,
    token: Option<String>,
    connected: bool,

    // optimistic: set when `join chat` is sent, never confirmed by the server
    active_chat: Option<Chat>,
    messages: Vec<Message>,
    notifications: Vec<Message>,
    refresh: bool,

    typing: TypingState,
    debouncer: TypingDebouncer,
}

impl PresenceSession {
    pub fn new(user: UserRef) -> Self {
        PresenceSession {
            user,
            token: None,
            connected: false,
            active_chat: None,
            messages: Vec::new(),
            notifications: Vec::new(),
            refresh: false,
            typing: TypingState::default(),
            debouncer: TypingDebouncer::default(),
        }
    }

    /// Sent along with `setup` so a verifying server can check the identity.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_debouncer(mut self, debouncer: TypingDebouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    pub fn setup(&self) -> ClientEvent {
        let mut payload = self.user_data();
        if let Some(token) = &self.token {
            payload["token"] = json!(token);
        }
        ClientEvent::Setup(payload)
    }

    /// Switches the open chat and joins its room. Messages are cleared until
    /// [`history_loaded`](Self::history_loaded) delivers the stored ones.
    pub fn open_chat(&mut self, chat: Chat) -> Vec<ClientEvent> {
        let mut events = Vec::new();

        if self.debouncer.reset() {
            if let Some(previous) = &self.active_chat {
                events.push(ClientEvent::StopTyping(previous.id.clone(), self.user_data()));
            }
        }

        self.typing.clear();
        self.messages.clear();
        events.push(ClientEvent::JoinChat(chat.id.clone()));
        self.active_chat = Some(chat);

        events
    }

    /// Returns `false` when the user has moved on to another chat meanwhile.
    pub fn history_loaded(&mut self, chat_id: &str, history: Vec<Message>) -> bool {
        if self.active_chat_id() != Some(chat_id) {
            return false;
        }

        let arrived = std::mem::replace(&mut self.messages, history);
        for message in arrived {
            if !self.messages.iter().any(|m| m.same_as(&message)) {
                self.messages.push(message);
            }
        }
        true
    }

    pub fn on_event(&mut self, event: ServerEvent) -> Option<SessionChange> {
        match event {
            ServerEvent::Connected => {
                self.connected = true;
                Some(SessionChange::Connected)
            }
            ServerEvent::Typing(user) => {
                let user = decode_user(user)?;
                self.typing
                    .insert(user)
                    .then(|| SessionChange::TypingChanged(self.typing.users().to_vec()))
            }
            ServerEvent::StopTyping(user) => {
                let user = decode_user(user)?;
                self.typing
                    .remove(&user.id)
                    .then(|| SessionChange::TypingChanged(self.typing.users().to_vec()))
            }
            ServerEvent::MessageReceived(raw) => {
                let message = Message::from_value(raw)
                    .inspect_err(|err| debug!(error = %err, "ignoring undecodable message"))
                    .ok()?;
                self.message_received(message)
            }
        }
    }

    fn message_received(&mut self, message: Message) -> Option<SessionChange> {
        if self.active_chat_id() == Some(message.chat.id.as_str()) {
            self.typing.remove(&message.sender.id);
            self.messages.push(message.clone());
            return Some(SessionChange::Appended(message));
        }

        if self.notifications.iter().any(|n| n.same_as(&message)) {
            return None;
        }

        self.notifications.insert(0, message.clone());
        self.refresh = true;
        Some(SessionChange::Notified(message))
    }

    /// `typing` for the first keystroke of a burst, nothing otherwise.
    pub fn keystroke(&mut self, now: Instant) -> Option<ClientEvent> {
        if !self.connected {
            return None;
        }
        let chat_id = self.active_chat.as_ref()?.id.clone();

        self.debouncer
            .keystroke(now)
            .then(|| ClientEvent::Typing(chat_id, self.user_data()))
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// `stop typing` once the quiet period after the last keystroke is over.
    pub fn poll_typing(&mut self, now: Instant) -> Option<ClientEvent> {
        if !self.debouncer.poll(now) {
            return None;
        }
        let chat_id = self.active_chat.as_ref()?.id.clone();

        Some(ClientEvent::StopTyping(chat_id, self.user_data()))
    }

    /// Ends any typing burst before a message is written.
    pub fn begin_send(&mut self) -> Option<ClientEvent> {
        self.debouncer.reset();
        let chat_id = self.active_chat.as_ref()?.id.clone();

        Some(ClientEvent::StopTyping(chat_id, self.user_data()))
    }

    /// Records a message the persistence service has stored and returns the
    /// event announcing it.
    pub fn message_sent(&mut self, message: Message) -> ClientEvent {
        if self.active_chat_id() == Some(message.chat.id.as_str()) {
            self.messages.push(message.clone());
        }
        ClientEvent::NewMessage(message.raw)
    }

    pub fn remove_notification(&mut self, message_id: &str) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id.as_deref() != Some(message_id));
        self.notifications.len() != before
    }

    /// Whether the chat list should be fetched again; clears the flag.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh)
    }

    /// Snapshot of the notification list; consumes the refresh flag.
    pub fn notifications_changed(&mut self) -> SessionChange {
        SessionChange::NotificationsChanged {
            notifications: self.notifications.clone(),
            refresh: self.take_refresh(),
        }
    }

    pub fn user(&self) -> &UserRef {
        &self.user
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat.as_ref()
    }

    pub fn active_chat_id(&self) -> Option<&str> {
        self.active_chat.as_ref().map(|chat| chat.id.as_str())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn notifications(&self) -> &[Message] {
        &self.notifications
    }

    pub fn typing_users(&self) -> &[UserRef] {
        self.typing.users()
    }

    fn user_data(&self) -> Value {
        let mut data = json!({ "_id": self.user.id });
        if let Some(name) = &self.user.name {
            data["name"] = json!(name);
        }
        if let Some(pic) = &self.user.pic {
            data["pic"] = json!(pic);
        }
        data
    }
}

fn decode_user(user: Value) -> Option<UserRef> {
    serde_json::from_value(user)
        .inspect_err(|err| debug!(error = %err, "ignoring typing event without user"))
        .ok()
}
