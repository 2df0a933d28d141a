//! Bearer-token checks against the external auth service.
//!
//! Without a verifier the realtime layer trusts whatever `_id` a client
//! announces in `setup`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{AppResult, GetField};

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolves a bearer token to the user id it was issued for.
    async fn verify(&self, token: &str) -> AppResult<String>;
}

/// Asks the auth service who a token belongs to: `GET <url>` with the token
/// as bearer, answered by a user record carrying `_id`. A call that takes
/// longer than `timeout` fails.
pub struct HttpTokenVerifier {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpTokenVerifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        HttpTokenVerifier {
            url: url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> AppResult<String> {
        let user: Value = self.client
            .get(&self.url)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        user.get_str_field("_id")
    }
}

/// A `setup` payload passes when its `token` resolves to its own `_id`.
pub async fn verify_setup(verifier: &dyn TokenVerifier, user: &Value) -> AppResult<()> {
    let claimed = user.get_str_field("_id")?;
    let token = user.get_str_field("token")?;

    let verified = verifier.verify(&token).await?;
    if verified != claimed {
        return Err(format!("token belongs to {verified}, setup claimed {claimed}").into());
    }

    Ok(())
}
