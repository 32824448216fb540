//! Turning raw responses into payloads or API errors.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::error::{ApiError, Error, REQUEST_FAILED};

/// How the response body should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Text,
    /// Binary body together with its declared content type.
    Blob,
    /// Binary body as-is.
    Bytes,
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No body was read, or a JSON body failed to parse.
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Blob {
        content_type: Option<String>,
        data: Bytes,
    },
    Bytes(Bytes),
}

impl Payload {
    /// The `message` field of a JSON object body.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Json(Value::Object(map)) => map.get("message").map(|message| match message {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            }),
            _ => None,
        }
    }

    pub fn deserialize<T>(self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let value = match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
            Self::Blob { .. } | Self::Bytes(_) => {
                return Err(Error::Deserialize(serde::de::Error::custom(
                    "binary payload cannot be deserialized",
                )))
            }
        };
        Ok(serde_json::from_value(value)?)
    }
}

/// Reads the body according to `format` (or the declared content type) and
/// fails with an [`ApiError`] for any status outside 2xx.
pub async fn decode(res: reqwest::Response, format: Option<Format>) -> Result<Payload, Error> {
    let status = res.status();
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let parse_json = match format {
        Some(format) => format == Format::Json,
        None => content_type
            .as_deref()
            .map_or(false, |value| value.contains("application/json")),
    };

    let payload = if parse_json {
        let body = res.bytes().await?;
        // A broken body must not hide the status, so parse failures become Empty.
        match serde_json::from_slice(&body) {
            Ok(value) => Payload::Json(value),
            Err(err) => {
                debug!(message = "Discarding malformed JSON body", status = status.as_u16(), error = %err);
                Payload::Empty
            }
        }
    } else {
        match format {
            Some(Format::Text) => Payload::Text(res.text().await?),
            Some(Format::Blob) => Payload::Blob {
                content_type,
                data: res.bytes().await?,
            },
            Some(Format::Bytes) => Payload::Bytes(res.bytes().await?),
            Some(Format::Json) | None => Payload::Empty,
        }
    };

    if !status.is_success() {
        let message = payload
            .message()
            .or_else(|| status.canonical_reason().map(str::to_owned))
            .unwrap_or_else(|| REQUEST_FAILED.to_owned());
        return Err(ApiError {
            message,
            status: Some(status.as_u16()),
            details: payload,
        }
        .into());
    }

    Ok(payload)
}
