//! Structured errors for the client protocol layer.
//!
//! Decode and transport failures are normalized into the same user-visible
//! error surface as explicit server error events; persistence failures after
//! a successful terminal event are logged, not surfaced.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error categories for [`ClientError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed stream frame (SSE framing or JSON payload)
    Decode,
    /// Stream aborted or network failure before a terminal event
    Transport,
    /// Explicit error event/field from the server
    Api,
    /// Write to the local store failed
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Api => write!(f, "api"),
            ErrorKind::Persistence => write!(f, "persistence"),
        }
    }
}

/// Structured error with kind and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientError {
    /// Error category
    pub kind: ErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ClientError {
    /// Creates a new client error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates a client error with details attached.
    pub fn with_details(
        kind: ErrorKind,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Creates an HTTP status error, extracting a cleaner message from a JSON
    /// error body when one is present.
    pub fn http_status(status: u16, body: &str) -> Self {
        if !body.is_empty()
            && let Ok(json) = serde_json::from_str::<serde_json::Value>(body)
            && let Some(msg) = json.get("error").and_then(|v| v.as_str())
        {
            return Self {
                kind: ErrorKind::Api,
                message: format!("HTTP {status}: {msg}"),
                details: Some(body.to_string()),
            };
        }
        Self {
            kind: ErrorKind::Api,
            message: format!("HTTP {status}"),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ClientError {}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Classifies a reqwest error into a [`ClientError`].
pub fn classify_reqwest_error(err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::new(ErrorKind::Transport, format!("Request timed out: {err}"))
    } else if err.is_connect() {
        ClientError::new(ErrorKind::Transport, format!("Connection failed: {err}"))
    } else {
        ClientError::new(ErrorKind::Transport, format!("Request failed: {err}"))
    }
}
