//! Session client errors.

use crate::validation::FieldError;

/// Failures surfaced by the session client.
///
/// `Clone` so one refresh outcome can be handed to every queued request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The server answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Api {
        status: u16,
        message: String,
        errors: Vec<FieldError>,
    },
    /// No refresh token is held, so the session cannot be renewed.
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Token refresh timed out")]
    RefreshTimeout,
    /// The refresh task went away without reporting an outcome.
    #[error("Token refresh abandoned")]
    RefreshAbandoned,
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Session file error: {0}")]
    Persistence(String),
}

impl SessionError {
    /// HTTP status, when the error came from a server response.
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for the session's `error` field.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}
