//! Error types for the notification client

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Distinguishes between retryable and permanent errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retryable,
    Permanent,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    /// No bearer token is available; raised before any request is sent
    #[error("not authenticated: no bearer token available")]
    Unauthenticated,

    #[error("request failed with status {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("broker handshake failed: {0}")]
    Handshake(String),

    #[error("broker protocol error: {0}")]
    Protocol(#[from] crate::stomp::StompError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid transition: cannot {action} a request that is {from}")]
    InvalidTransition { from: String, action: String },

    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Http { status, .. } if status.is_server_error() => ErrorKind::Retryable,
            ClientError::Transport(_)
            | ClientError::WebSocket(_)
            | ClientError::Handshake(_) => ErrorKind::Retryable,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    /// HTTP status of the failed call, when the server answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }
}
