//! Error Types
//!
//! One error enum for the whole engine. Callers mostly care about the
//! transport/validation split, which decides between "refetch" and
//! "tell the user and leave the store alone".

use thiserror::Error;

/// Common result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or IO failure talking to the server or push channel
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered 401; the viewer must sign in again
    #[error("session expired")]
    SessionExpired,

    /// The server refused the request (non-2xx with a message)
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Refused locally before any request was sent
    #[error("invalid operation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// An editing operation was attempted with no card open
    #[error("no card is open for editing")]
    NotEditing,
}

impl SyncError {
    /// Failures where the request may or may not have reached the server
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Decode(_))
    }

    /// Failures the user caused and can fix; no local mutation follows them
    pub fn is_validation(&self) -> bool {
        match self {
            SyncError::Validation(_) | SyncError::NotFound(_) => true,
            SyncError::Rejected { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Decode(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}
