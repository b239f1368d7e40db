//! Error types and the response error mapper for the admin API client.
//!
//! # Design
//! Failures fall into three buckets: the exchange never completed
//! (`Transport`), it completed with a non-2xx status (`Api`), or it succeeded
//! but the body did not have the expected shape (`Decode`). `Api` keeps the
//! raw body next to the extracted message so callers can make their own
//! retry decisions. Nothing here retries or recovers.

use serde::Deserialize;
use thiserror::Error;

use crate::http::HttpResponse;

/// Message used when a non-2xx body carries neither `message` nor `error`.
pub const UNKNOWN_ERROR: &str = "Unknown error";

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by `AdminClient` operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was obtained from the service.
    #[error("request error: {0}")]
    Transport(#[from] TransportError),

    /// The service answered with a non-2xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A 2xx response body did not match the expected shape.
    #[error("failed to parse response: {0}")]
    Decode(String),

    /// The request payload could not be serialized to JSON.
    #[error("failed to serialize request: {0}")]
    Serialization(String),
}

impl ClientError {
    /// The API error, if the service answered with a non-2xx status.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// The exchange could not be completed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or I/O failure reported by the HTTP stack.
    #[error("{0}")]
    Http(String),

    /// The caller's deadline passed before the exchange completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// A completed exchange with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API error: Status: {status_text}, Message: {message}, Body: {body}")]
pub struct ApiError {
    pub status: u16,
    /// Status line such as `404 Not Found`.
    pub status_text: String,
    /// Raw response body.
    pub body: String,
    /// Best-effort human message extracted from the body.
    pub message: String,
}

impl ApiError {
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status: response.status,
            status_text: status_text(response.status),
            body: response.body.clone(),
            message: extract_message(&response.body),
        }
    }
}

/// Map a completed exchange to `Ok` for 2xx and `ClientError::Api` otherwise.
pub fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::from_response(response).into())
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

/// Pull `message`, then `error`, out of a JSON error body.
///
/// Only string values count. Any parse failure yields [`UNKNOWN_ERROR`].
pub fn extract_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return UNKNOWN_ERROR.to_string();
    };
    [parsed.message, parsed.error]
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

fn status_text(status: u16) -> String {
    let reason = ureq::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason());
    match reason {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    }
}
