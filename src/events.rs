//! Realtime wire events.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <args>}`.
//! Events with more than one argument carry them as an array, so
//! `typing("chat1", user)` travels as `{"event":"typing","data":["chat1",{...}]}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppResult;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announces identity. The payload must carry a string `_id`.
    #[serde(rename = "setup")]
    Setup(Value),
    #[serde(rename = "join chat")]
    JoinChat(String),
    #[serde(rename = "typing")]
    Typing(String, Value),
    #[serde(rename = "stop typing")]
    StopTyping(String, Value),
    /// A message already written to the persistence service.
    #[serde(rename = "new message")]
    NewMessage(Value),
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "typing")]
    Typing(Value),
    #[serde(rename = "stop typing")]
    StopTyping(Value),
    #[serde(rename = "message received")]
    MessageReceived(Value),
}

impl ClientEvent {
    pub fn decode(text: &str) -> AppResult<ClientEvent> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Setup(_) => "setup",
            ClientEvent::JoinChat(_) => "join chat",
            ClientEvent::Typing(..) => "typing",
            ClientEvent::StopTyping(..) => "stop typing",
            ClientEvent::NewMessage(_) => "new message",
        }
    }
}

impl ServerEvent {
    pub fn decode(text: &str) -> AppResult<ServerEvent> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected => "connected",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::StopTyping(_) => "stop typing",
            ServerEvent::MessageReceived(_) => "message received",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_typing_with_positional_args() {
        let event = ClientEvent::decode(r#"{"event":"typing","data":["chat1",{"_id":"u1","name":"Ann"}]}"#).unwrap();
        assert_eq!(event, ClientEvent::Typing("chat1".into(), json!({ "_id": "u1", "name": "Ann" })));
    }

    #[test]
    fn decodes_join_chat() {
        let event = ClientEvent::decode(r#"{"event":"join chat","data":"chat9"}"#).unwrap();
        assert_eq!(event, ClientEvent::JoinChat("chat9".into()));
    }

    #[test]
    fn rejects_unknown_and_incomplete_frames() {
        assert!(ClientEvent::decode(r#"{"event":"shout","data":"hi"}"#).is_err());
        assert!(ClientEvent::decode(r#"{"event":"typing","data":["chat1"]}"#).is_err());
        assert!(ClientEvent::decode("not json").is_err());
    }

    #[test]
    fn connected_has_no_data() {
        assert_eq!(ServerEvent::Connected.encode().unwrap(), r#"{"event":"connected"}"#);
        assert_eq!(ServerEvent::decode(r#"{"event":"connected"}"#).unwrap(), ServerEvent::Connected);
    }

    #[test]
    fn message_received_keeps_payload_verbatim() {
        let message = json!({ "_id": "m1", "extra": { "nested": [1, 2] } });
        let text = ServerEvent::MessageReceived(message.clone()).encode().unwrap();
        assert_eq!(ServerEvent::decode(&text).unwrap(), ServerEvent::MessageReceived(message));
    }
}
