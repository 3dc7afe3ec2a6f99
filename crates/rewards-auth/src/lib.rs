//! Per-account session artifacts for the rewards farmer
//!
//! Two persisted JSON maps keep state stable across runs:
//! - `session_user_agents.json`: account → browser user agent (the fingerprint)
//! - `tokens.json`: account → bearer token
//!
//! Both are best-effort caches. A missing or corrupt file loads as empty and
//! every entry is rewritten on the next successful login or assignment.
//! Bearer tokens are JWTs; `jwt::is_expired` decides whether a cached token
//! can be reused without logging in again.

pub mod constants;
pub mod error;
pub mod jwt;
pub mod session;
pub mod store;
pub mod tokens;

pub use constants::DEFAULT_USER_AGENTS;
pub use error::{Error, Result};
pub use jwt::{Claims, decode_claims, is_expired, now_unix};
pub use session::{Platform, SessionStore, resolve_platform, select_user_agent};
pub use store::JsonMapStore;
pub use tokens::TokenStore;
