use std::{str::FromStr, time::Duration};

use crate::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// When set, `setup` must carry a bearer token that this endpoint resolves to the announced `_id`.
    pub auth_verify_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 5000,
            cors_origin: "http://localhost:3000".to_owned(),
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(60_000),
            auth_verify_url: None,
        }
    }
}

impl Config {
    /// Reads the process environment, falling back to `.env`.
    pub fn from_env() -> AppResult<Config> {
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Config> {
        let defaults = Config::default();

        Ok(Config {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            cors_origin: lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            ping_interval: Duration::from_millis(parse_or(&lookup, "PING_INTERVAL_MS", 25_000)?),
            ping_timeout: Duration::from_millis(parse_or(&lookup, "PING_TIMEOUT_MS", 60_000)?),
            auth_verify_url: lookup("AUTH_VERIFY_URL").filter(|url| !url.is_empty()),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| AppError::from(format!("invalid {key}={raw}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_socket_settings() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.ping_timeout, Duration::from_secs(60));
        assert_eq!(config.cors_origin, "http://localhost:3000");
        assert!(config.auth_verify_url.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("PING_TIMEOUT_MS", "1500"),
            ("AUTH_VERIFY_URL", "http://auth.local/api/user/me"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.ping_timeout, Duration::from_millis(1500));
        assert_eq!(config.auth_verify_url.as_deref(), Some("http://auth.local/api/user/me"));
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("invalid PORT=eighty"));
    }

    #[test]
    fn empty_auth_url_disables_verification() {
        let config = Config::from_lookup(lookup(&[("AUTH_VERIFY_URL", "")])).unwrap();
        assert!(config.auth_verify_url.is_none());
    }
}
