//! Client for the remote rewards API
//!
//! `RequestClient` performs one logical call with the resilience policy the
//! API needs: bounded retries with a fixed delay, a long cooldown on 429, and
//! a transparent re-login plus single replay when a bearer token is rejected
//! with 401. Re-login itself is delegated through [`Reauthenticate`] so the
//! client never owns credentials or CAPTCHA solving.

pub mod classify;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod headers;
pub mod types;

pub use classify::{Failure, classify};
pub use client::{ApiResponse, CallOptions, ClientConfig, RequestClient, RetryPolicy};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use types::{CheckinTime, LoginData, Node, Task, TaskCode, UserProfile};

use std::future::Future;
use std::pin::Pin;

/// Boxed future used at the dyn-compatible seams below.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Obtains a fresh bearer token after the server rejected the current one.
///
/// Implemented by the account session: it solves a CAPTCHA, logs in and
/// persists the new token. An error here is fatal for the account.
pub trait Reauthenticate: Send + Sync {
    fn reauthenticate(&self) -> BoxFuture<'_, Result<String>>;
}

/// Opaque CAPTCHA solver returning the solved challenge token.
pub trait CaptchaSolver: Send + Sync {
    fn solve(&self) -> BoxFuture<'_, Result<String>>;
}
