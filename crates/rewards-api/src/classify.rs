//! Failure classification for rewards API responses
//!
//! Maps a failed attempt to the action the request client takes next:
//! - `RateLimited`: cool down, then retry
//! - `Unauthorized`: re-login and replay once
//! - `ExpectedRejection`: stop immediately (task not eligible or already done)
//! - `Network`: no HTTP response at all, retry
//! - `Transient`: any other status, retry

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RateLimited,
    Unauthorized,
    ExpectedRejection,
    Network,
    Transient,
}

/// Classify a failed attempt by HTTP status (`None` when the request never
/// got a response) and the endpoint it targeted.
///
/// A 400 is only final on the task completion endpoint; the server uses it
/// for tasks that cannot be claimed, without saying why.
pub fn classify(status: Option<u16>, endpoint: Endpoint) -> Failure {
    match status {
        None => Failure::Network,
        Some(429) => Failure::RateLimited,
        Some(401) => Failure::Unauthorized,
        Some(400) if endpoint == Endpoint::CompleteTask => Failure::ExpectedRejection,
        Some(_) => Failure::Transient,
    }
}
