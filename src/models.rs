//! Typed views over chat records owned by the persistence service.
//!
//! The realtime server never decodes these; it routes the raw JSON. The
//! client decodes them to decide where an incoming message belongs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
}

impl UserRef {
    pub fn new(id: impl Into<String>) -> Self {
        UserRef { id: id.into(), name: None, pic: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "chatName")]
    pub chat_name: Option<String>,
    #[serde(default, rename = "isGroupChat")]
    pub is_group_chat: bool,
    #[serde(default)]
    pub users: Vec<UserRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Option<String>,
    pub sender: UserRef,
    pub chat: Chat,
    pub content: String,

    /// The record exactly as the persistence service returned it.
    pub raw: Value,
}

#[derive(Deserialize)]
struct MessageFields {
    #[serde(default, rename = "_id")]
    id: Option<String>,
    sender: UserRef,
    chat: Chat,
    #[serde(default)]
    content: String,
}

impl Message {
    pub fn from_value(raw: Value) -> AppResult<Message> {
        let MessageFields { id, sender, chat, content } = serde_json::from_value(raw.clone())?;

        Ok(Message { id, sender, chat, content, raw })
    }

    /// Message id when present, otherwise identity of the whole record.
    pub fn same_as(&self, other: &Message) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.raw == other.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_populated_message() {
        let raw = json!({
            "_id": "m1",
            "sender": { "_id": "u1", "name": "Ann", "pic": "a.png" },
            "content": "hello",
            "chat": {
                "_id": "c1",
                "chatName": "sender",
                "isGroupChat": false,
                "users": [{ "_id": "u1" }, { "_id": "u2" }]
            }
        });

        let message = Message::from_value(raw.clone()).unwrap();
        assert_eq!(message.id.as_deref(), Some("m1"));
        assert_eq!(message.sender.name.as_deref(), Some("Ann"));
        assert_eq!(message.chat.users.len(), 2);
        assert_eq!(message.raw, raw);
    }

    #[test]
    fn missing_chat_is_an_error() {
        assert!(Message::from_value(json!({ "sender": { "_id": "u1" } })).is_err());
    }

    #[test]
    fn same_as_prefers_ids() {
        let a = Message::from_value(json!({ "_id": "m1", "sender": { "_id": "u1" }, "chat": { "_id": "c1" }, "content": "a" })).unwrap();
        let b = Message::from_value(json!({ "_id": "m1", "sender": { "_id": "u1" }, "chat": { "_id": "c1" }, "content": "edited" })).unwrap();
        let c = Message::from_value(json!({ "sender": { "_id": "u1" }, "chat": { "_id": "c1" }, "content": "a" })).unwrap();

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(c.same_as(&c.clone()));
    }

    #[test]
    fn user_ref_omits_unset_fields() {
        assert_eq!(serde_json::to_value(UserRef::new("u1")).unwrap(), json!({ "_id": "u1" }));
    }
}
