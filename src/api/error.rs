use std::fmt;

use super::decode::Payload;

pub const SESSION_EXPIRED: &str = "session expired, please log in again";
pub const REQUEST_FAILED: &str = "API request failed";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("API base URL is not configured, set FEED_API_BASE_URL")]
    MissingBaseUrl,
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("server: {0}")]
    Api(#[from] ApiError),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("refresh task: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// HTTP status of the failed response, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => err.status,
            Self::Reqwest(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// A response outside the 2xx range.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub message: String,
    pub status: Option<u16>,
    pub details: Payload,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
            details: Payload::Empty,
        }
    }

    pub fn session_expired() -> Self {
        Self::new(SESSION_EXPIRED, Some(401))
    }

    /// Turns a failed refresh into a session-expired error, keeping the server's
    /// message and details when the refresh endpoint answered with one.
    pub fn refresh_failed(err: &Error) -> Self {
        match err {
            Error::Api(api) => Self {
                message: api.message.clone(),
                status: Some(401),
                details: api.details.clone(),
            },
            other => Self::new(format!("session refresh failed: {other}"), Some(401)),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({} status code)", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiError {}
