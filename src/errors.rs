use reqwest::StatusCode;
use thiserror::Error;

/// Every failure the client surfaces to its caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend rejected login or registration data. User-correctable.
    #[error("authentication failed ({status}): {message}")]
    Authentication { status: StatusCode, message: String },

    /// The refresh exchange failed; the user has to sign in again.
    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("not signed in")]
    NotSignedIn,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("token storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub fn authentication(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Authentication {
            status,
            message: message.into(),
        }
    }

    pub fn api(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Transport failures are the only errors worth offering a retry for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Errors after which the caller should send the user to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotSignedIn)
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
