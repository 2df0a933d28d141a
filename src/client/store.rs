use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{models::Message, AppResult};

/// The persistence service that owns chat and message records.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn fetch_messages(&self, chat_id: &str) -> AppResult<Vec<Message>>;

    /// Writes the message and returns the stored record, populated with its chat.
    async fn send_message(&self, chat_id: &str, content: &str) -> AppResult<Message>;
}

pub struct HttpChatStore {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpChatStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();

        HttpChatStore {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatStore for HttpChatStore {
    async fn fetch_messages(&self, chat_id: &str) -> AppResult<Vec<Message>> {
        let records: Vec<Value> = self.client
            .get(format!("{}/api/message/{chat_id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        records.into_iter().map(Message::from_value).collect()
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> AppResult<Message> {
        let record: Value = self.client
            .post(format!("{}/api/message", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "content": content, "chatId": chat_id }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Message::from_value(record)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers::{body_json, header, method, path}, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record(id: &str, content: &str) -> Value {
        json!({
            "_id": id,
            "content": content,
            "sender": { "_id": "u1", "name": "Ann" },
            "chat": { "_id": "c1", "users": [{ "_id": "u1" }, { "_id": "u2" }] },
        })
    }

    #[tokio::test]
    async fn fetches_chat_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/message/c1"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([record("m1", "a"), record("m2", "b")])))
            .mount(&server)
            .await;

        let store = HttpChatStore::new(format!("{}/", server.uri()), "t0k");
        let messages = store.fetch_messages("c1").await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "b");
    }

    #[tokio::test]
    async fn posts_new_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/message"))
            .and(body_json(json!({ "content": "hello", "chatId": "c1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(record("m9", "hello")))
            .mount(&server)
            .await;

        let store = HttpChatStore::new(server.uri(), "t0k");
        let message = store.send_message("c1", "hello").await.unwrap();

        assert_eq!(message.id.as_deref(), Some("m9"));
        assert_eq!(message.chat.id, "c1");
    }

    #[tokio::test]
    async fn server_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let store = HttpChatStore::new(server.uri(), "t0k");
        assert!(store.fetch_messages("c1").await.is_err());
    }
}
