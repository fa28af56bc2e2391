use std::fmt;

/// Result type for chzzk-rs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chzzk-rs
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Invalid configuration or argument (unknown event name, empty channel id)
    Config(String),

    /// Access token missing, expired and unrefreshable, or rejected after refresh
    Authorization(String),

    /// API error response
    Api { status: u16, message: String },

    /// Server sent something that does not follow the protocol
    Protocol(String),

    /// Missing required field
    MissingField(String),

    /// WebSocket connection error
    WebSocket(String),

    /// WebSocket connection closed
    ConnectionClosed,

    /// Reconnection failed after multiple attempts
    ReconnectFailed {
        attempts: u32,
        last_error: String,
    },
}

impl Error {
    /// Whether this error is an authorization failure (HTTP 401 or a failed refresh)
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Error::Authorization(_) | Error::Api { status: 401, .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Authorization(msg) => write!(f, "Authorization error: {}", msg),
            Error::Api { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::MissingField(field) => write!(f, "Missing required field: {}", field),
            Error::WebSocket(msg) => write!(f, "WebSocket error: {}", msg),
            Error::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Error::ReconnectFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "Reconnection failed after {} attempts: {}",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}
