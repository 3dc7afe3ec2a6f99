//! Bearer token inspection
//!
//! The rewards API issues JWTs. Only the payload is decoded (no signature
//! check): the expiry claim decides whether a cached token is worth sending
//! at all. A token that passes this check can still be rejected with 401,
//! which the request client handles by re-authenticating.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Claims read from the token payload. Unknown claims are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry as unix seconds
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Decode the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::MalformedToken("expected three dot-separated segments".into()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not a claims object: {e}")))
}

/// Whether `token` should be treated as expired at `now` (unix seconds).
///
/// Malformed tokens count as expired. Tokens without `exp` do not expire on
/// the client side.
pub fn is_expired(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(Claims { exp: Some(exp), .. }) => exp <= now,
        Ok(Claims { exp: None, .. }) => false,
        Err(_) => true,
    }
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
pub(crate) fn token_with_payload(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}
