use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of client errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorKind {
    /// Non-success HTTP status, connection failure, or a broken body stream
    Transport,
    /// The response carried no readable body
    BodyMissing,
    /// A single stream record failed to decode (recovered by the codec)
    Decode,
    /// One chart failed to rasterize (recovered by the pipeline)
    Capture,
    /// The agent reported a failure through an `error` event
    RemoteAgent,
    /// An export was requested while another one is still running
    ExportInFlight,
    /// Export or preview was requested with no current deck
    NoPresentation,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErrorKind::Transport => write!(f, "transport"),
            ClientErrorKind::BodyMissing => write!(f, "body_missing"),
            ClientErrorKind::Decode => write!(f, "decode"),
            ClientErrorKind::Capture => write!(f, "capture"),
            ClientErrorKind::RemoteAgent => write!(f, "remote_agent"),
            ClientErrorKind::ExportInFlight => write!(f, "export_in_flight"),
            ClientErrorKind::NoPresentation => write!(f, "no_presentation"),
        }
    }
}

/// Structured client error with kind and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientError {
    /// Error category
    pub kind: ClientErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Transport, message)
    }

    pub fn body_missing() -> Self {
        Self::new(ClientErrorKind::BodyMissing, "Response body is missing")
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Decode, message)
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Capture, message)
    }

    /// Creates an error from an agent `error` event. The message is shown as-is.
    pub fn remote_agent(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::RemoteAgent, message)
    }

    pub fn export_in_flight() -> Self {
        Self::new(
            ClientErrorKind::ExportInFlight,
            "An export is already in progress",
        )
    }

    pub fn no_presentation(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::NoPresentation, message)
    }

    /// Creates a transport error from a non-success HTTP status.
    ///
    /// The server reports failures as `{"detail": "..."}`; when present the
    /// detail becomes part of the message and the raw body goes to `details`.
    pub fn http_status(status: u16, body: &str) -> Self {
        if body.is_empty() {
            return Self::transport(format!("HTTP {status}"));
        }
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(detail) = json.get("detail").and_then(Value::as_str)
        {
            return Self {
                kind: ClientErrorKind::Transport,
                message: format!("HTTP {status}: {detail}"),
                details: Some(body.to_string()),
            };
        }
        Self {
            kind: ClientErrorKind::Transport,
            message: format!("HTTP {status}"),
            details: Some(body.to_string()),
        }
    }

    /// Returns true for failures that abort the current exchange.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind,
            ClientErrorKind::Decode | ClientErrorKind::Capture
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ClientError {}

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

pub(crate) fn classify_reqwest_error(e: &reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::transport(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ClientError::transport(format!("Connection failed: {e}"))
    } else if e.is_request() {
        ClientError::transport(format!("Request error: {e}"))
    } else {
        ClientError::transport(format!("Network error: {e}"))
    }
}
