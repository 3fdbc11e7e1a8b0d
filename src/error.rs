use thiserror::Error;

use crate::parser::ParseError;
use crate::state::ConnectionState;

/// Error types for the deepstream-rs library
#[derive(Error, Debug)]
pub enum DeepstreamError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Parser error: {0}")]
    ParseError(#[from] ParseError),
    #[error("Version mismatch; expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
    #[error("URI must not be empty")]
    EmptyUri,
    #[error("Empty {0} name")]
    EmptyName(&'static str),
    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    #[error("Invalid state transition from {state} on {header}")]
    InvalidStateTransition {
        state: ConnectionState,
        header: String,
    },
    #[error("Too many redirections (limit {0})")]
    TooManyRedirections(u32),
    #[error("Connection rejected by server")]
    ConnectionRejected,
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Connection closed unexpectedly")]
    SuddenDisconnect,
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Send error: {0}")]
    SendError(String),
    #[error("Timed out waiting for the server")]
    Timeout,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, DeepstreamError>;
