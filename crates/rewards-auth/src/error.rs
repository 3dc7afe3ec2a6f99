//! Error types for session artifact storage and token inspection

/// Errors from session store and token operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("store serialization error: {0}")]
    Serialize(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),
}

/// Result alias for session artifact operations.
pub type Result<T> = std::result::Result<T, Error>;
