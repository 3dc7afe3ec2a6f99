//! Service-specific error types

use thiserror::Error;

/// Startup failures. Any of these ends the process with a non-zero exit
/// before a single account runs.
///
/// Per-account failures never surface here: they are folded into worker
/// reports by the scheduler.
#[derive(Error, Debug)]
pub enum Error {
    #[error("preflight failed: {0}")]
    Preflight(#[from] rewards_pool::Error),

    #[error("endpoint discovery failed after {attempts} attempts: {message}")]
    EndpointDiscovery { attempts: u32, message: String },

    #[error("CAPTCHA api key missing: set CAPTCHA_API_KEY or captcha.api_key_file")]
    MissingCaptchaKey,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
