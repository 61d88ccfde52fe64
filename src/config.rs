use std::time::Duration;

use crate::connectivity::{Endpoint, API_URL_VAR};

pub const CLIENT_HOST_VAR: &str = "QUIZ_CLIENT_HOST";
pub const TIMEOUT_VAR: &str = "QUIZ_API_TIMEOUT_SECS";
pub const DB_PATH_VAR: &str = "QUIZ_BOT_DB";

const DEFAULT_CLIENT_HOST: &str = "localhost";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_DB_PATH: &str = "db.sqlite";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a whole number of seconds, got '{value}'")]
    InvalidTimeout { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub request_timeout: Duration,
    pub db_path: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client_host = lookup(CLIENT_HOST_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_HOST.to_string());
        let endpoint = Endpoint::resolve(lookup(API_URL_VAR).as_deref(), client_host.trim());

        let request_timeout = match lookup(TIMEOUT_VAR) {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidTimeout {
                    name: TIMEOUT_VAR,
                    value: raw.clone(),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            endpoint,
            request_timeout,
            db_path: lookup(DB_PATH_VAR).unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{Context, DEFAULT_API_URL};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_local_setup() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.endpoint.base_url, DEFAULT_API_URL);
        assert_eq!(config.endpoint.context, Context::Local);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.db_path, "db.sqlite");
    }

    #[test]
    fn reads_deployed_setup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("QUIZ_API_URL", "https://api.example.com"),
            ("QUIZ_CLIENT_HOST", "quizapp.example.com"),
            ("QUIZ_API_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint.base_url, "https://api.example.com");
        assert!(config.endpoint.explicitly_configured);
        assert_eq!(config.endpoint.context, Context::Deployed);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_timeout() {
        assert_eq!(
            ClientConfig::from_lookup(lookup(&[("QUIZ_API_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::InvalidTimeout {
                name: TIMEOUT_VAR,
                value: "soon".to_string()
            })
        );
    }
}
