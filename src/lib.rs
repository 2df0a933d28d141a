pub mod auth;
pub mod client;
pub mod config;
pub mod events;
pub mod models;
pub mod realtime;

use std::{fmt, sync::Arc};

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, routing::get, Router};
use serde_json::Value;

pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: realtime::Hub,
    pub config: Arc<Config>,
    pub verifier: Option<Arc<dyn auth::TokenVerifier>>,
}

impl AppState {
    /// Spawns the hub task, so this must run inside a tokio runtime.
    pub fn new(config: Config) -> Self {
        let verifier = config.auth_verify_url.clone().map(|url| {
            Arc::new(auth::HttpTokenVerifier::new(url, config.ping_timeout)) as Arc<dyn auth::TokenVerifier>
        });

        AppState {
            hub: realtime::Hub::spawn(),
            config: Arc::new(config),
            verifier,
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(realtime::router())
        .with_state(app_state)
}

async fn index() -> &'static str {
    "API is Running Successfully"
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
    fn get_array_field(&self, field: &str) -> AppResult<&Vec<Value>>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }

    fn get_array_field(&self, field: &str) -> AppResult<&Vec<Value>> {
        self.get_obj_field(field)?
            .as_array()
            .ok_or(format!("expected {field} in {self} to be array").into())
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(axum::Error);
apperr_impl!(axum::http::header::InvalidHeaderValue);
apperr_impl!(reqwest::Error);
apperr_impl!(tokio_tungstenite::tungstenite::Error);
apperr_impl!(std::io::Error);
