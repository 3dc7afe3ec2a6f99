//! Error types for rewards API calls

/// Errors surfaced by [`crate::RequestClient`] after its retry policy ran.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network failure: {0}")]
    Network(String),

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Re-authentication after a 401 failed. Fatal for the account.
    #[error("re-authentication failed: {0}")]
    Unauthorized(String),

    #[error("request rejected ({status}): {message}")]
    ExpectedRejection { status: u16, message: String },

    #[error("retries exhausted after {attempts} attempts (status {status:?}): {message}")]
    RetriesExhausted {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("CAPTCHA solving failed: {0}")]
    Captcha(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of the last failed attempt, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ExpectedRejection { status, .. } => Some(*status),
            Error::RetriesExhausted { status, .. } => *status,
            Error::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether the account cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;
