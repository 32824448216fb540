//! Settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiClient;

pub const BASE_URL_VAR: &str = "FEED_API_BASE_URL";
pub const SESSION_FILE_VAR: &str = "FEED_SESSION_FILE";
pub const TIMEOUT_VAR: &str = "FEED_API_TIMEOUT_SECS";

pub const DEFAULT_SESSION_FILE: &str = ".feed-session.json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Prefix of every API path. Requests fail while this is unset.
    pub api_base_url: Option<String>,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source; unset and empty values count
    /// as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let request_timeout = match var(TIMEOUT_VAR) {
            Some(value) => value
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidTimeout {
                    var: TIMEOUT_VAR,
                    value,
                })?,
            None => defaults.request_timeout,
        };

        Ok(Self {
            api_base_url: var(BASE_URL_VAR),
            session_file: var(SESSION_FILE_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.session_file),
            request_timeout,
        })
    }

    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;
        Ok(client)
    }

    pub fn api_client(&self) -> Result<ApiClient, ConfigError> {
        Ok(ApiClient::new(self.http_client()?, self.api_base_url.clone()))
    }
}
