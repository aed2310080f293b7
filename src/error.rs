// Error handling module
// Defines the client error taxonomy

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the authenticated client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure unrelated to authentication
    #[error("Network error: {0}")]
    Network(String),

    /// Access token rejected on a first attempt; recovered internally
    #[error("Access credential expired")]
    CredentialExpired,

    /// Refresh failed, timed out, or no refresh credential is stored
    #[error("Session invalidated: {0}")]
    SessionInvalidated(String),

    /// A replayed request was rejected again
    #[error("Authentication exhausted for {method} {path}")]
    AuthenticationExhausted { method: String, path: String },

    /// Non-success response from the backend
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Credential persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether the error ends the session and requires a new login
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::SessionInvalidated(_) | ClientError::AuthenticationExhausted { .. }
        )
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => StatusCode::from_u16(*status).ok(),
            ClientError::AuthenticationExhausted { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection_failed"
        } else if err.is_request() {
            "request_error"
        } else if err.is_body() {
            "body_error"
        } else if err.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };
        ClientError::Network(format!("{} (kind: {})", err, kind))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
