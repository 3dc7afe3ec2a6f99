//! Request header construction
//!
//! Every client carries a fixed header set derived from its user agent: the
//! browser-like base headers plus `user-agent` and the `sec-ch-ua*` client
//! hints for the platform resolved from that agent. Per-call extra headers
//! are layered on top, and the bearer token goes last so nothing a caller
//! passes can replace it.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use rewards_auth::resolve_platform;
use std::str::FromStr;
use tracing::warn;

use crate::error::{Error, Result};

/// Origin the browser extension reports on node pings.
pub const EXTENSION_ORIGIN: &str = "chrome-extension://jbmdcnidiaknboflpljihfnbonjgegah";

const BASE_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("content-type", "application/json"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "cross-site"),
];

/// Build the fixed header set for a client using `user_agent`.
pub fn fingerprint_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in BASE_HEADERS {
        headers.insert(*name, HeaderValue::from_static(*value));
    }

    let platform = resolve_platform(user_agent).label();
    let ua = HeaderValue::from_str(user_agent)
        .map_err(|e| Error::Config(format!("invalid user agent: {e}")))?;
    headers.insert(USER_AGENT, ua);

    let client_hint = format!(
        "\"Not)A;Brand\";v=\"99\", \"{platform} WebView\";v=\"127\", \"Chromium\";v=\"127\""
    );
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_str(&client_hint)
            .map_err(|e| Error::Config(format!("invalid client hint: {e}")))?,
    );
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static(platform));
    Ok(headers)
}

/// Layer caller-supplied headers over `headers`.
///
/// Invalid names or values are skipped with a warning. `authorization` is
/// never taken from here.
pub fn inject_extra(headers: &mut HeaderMap, extra: &[(String, String)]) {
    for (name, value) in extra {
        let header = match HeaderName::from_str(name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        if header == AUTHORIZATION {
            warn!(header = %name, "refusing to overwrite authorization header");
            continue;
        }
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(header, value);
    }
}

/// Set `Authorization: Bearer <token>`, marking the value sensitive.
pub fn set_bearer(headers: &mut HeaderMap, token: &str) -> Result<()> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::Config(format!("token is not a valid header value: {e}")))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";
    const ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Mobile Safari/537.36";

    #[test]
    fn fingerprint_uses_platform_of_user_agent() {
        let headers = fingerprint_headers(IPHONE).unwrap();
        assert_eq!(headers.get("user-agent").unwrap(), IPHONE);
        assert_eq!(headers.get("sec-ch-ua-platform").unwrap(), "ios");
        assert_eq!(
            headers.get("sec-ch-ua").unwrap(),
            r#""Not)A;Brand";v="99", "ios WebView";v="127", "Chromium";v="127""#
        );

        let headers = fingerprint_headers(ANDROID).unwrap();
        assert_eq!(headers.get("sec-ch-ua-platform").unwrap(), "android");
    }

    #[test]
    fn unrecognized_agent_reports_unknown_platform() {
        let headers = fingerprint_headers("curl/8.0").unwrap();
        assert_eq!(headers.get("sec-ch-ua-platform").unwrap(), "Unknown");
        assert_eq!(headers.get("accept").unwrap(), "application/json, text/plain, */*");
    }

    #[test]
    fn control_characters_in_agent_are_rejected() {
        assert!(matches!(
            fingerprint_headers("bad\nagent"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn injects_extra_headers() {
        let mut headers = HeaderMap::new();
        inject_extra(
            &mut headers,
            &[
                ("origin".into(), EXTENSION_ORIGIN.into()),
                ("x-custom".into(), "test-value".into()),
            ],
        );
        assert_eq!(headers.get("origin").unwrap(), EXTENSION_ORIGIN);
        assert_eq!(headers.get("x-custom").unwrap(), "test-value");
    }

    #[test]
    fn extra_headers_cannot_replace_authorization() {
        let mut headers = HeaderMap::new();
        set_bearer(&mut headers, "real").unwrap();
        inject_extra(
            &mut headers,
            &[
                ("authorization".into(), "Bearer INJECTED".into()),
                ("x-other".into(), "kept".into()),
            ],
        );
        assert_eq!(headers.get("authorization").unwrap(), "Bearer real");
        assert_eq!(headers.get("x-other").unwrap(), "kept");
    }

    #[test]
    fn skips_invalid_extra_headers() {
        let mut headers = HeaderMap::new();
        inject_extra(
            &mut headers,
            &[
                ("bad header".into(), "v".into()),
                ("x-bad-value".into(), "line\nbreak".into()),
                ("x-good".into(), "ok".into()),
            ],
        );
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-good").unwrap(), "ok");
    }

    #[test]
    fn bearer_is_sensitive() {
        let mut headers = HeaderMap::new();
        set_bearer(&mut headers, "abc").unwrap();
        let value = headers.get("authorization").unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());
    }
}
