//! Proxy exit IP lookup

use std::time::Duration;

use rewards_api::BoxFuture;
use rewards_pool::{Error, IpLookup, Result};
use serde::Deserialize;

pub const IPIFY_URL: &str = "https://api.ipify.org?format=json";

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Asks an ipify-compatible service which address a proxy exits from.
pub struct IpifyLookup {
    url: String,
    timeout: Duration,
}

impl IpifyLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    async fn lookup_ip(&self, proxy_url: &str) -> Result<String> {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| Error::ProxyCheck(format!("invalid proxy URL: {e}")))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::ProxyCheck(e.to_string()))?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::ProxyCheck(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::ProxyCheck(format!(
                "IP lookup returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body: IpResponse = response
            .json()
            .await
            .map_err(|e| Error::ProxyCheck(format!("invalid IP lookup body: {e}")))?;
        Ok(body.ip)
    }
}

impl IpLookup for IpifyLookup {
    fn lookup<'a>(&'a self, proxy_url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let result = self.lookup_ip(proxy_url).await;
            crate::metrics::record_proxy_check(result.is_ok());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::Uri;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Plain HTTP forward proxy stand-in: answers every request itself and
    /// records the absolute URI it was asked for.
    async fn start_proxy(body: serde_json::Value) -> (String, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let app = axum::Router::new().fallback(move |uri: Uri| {
            let log = log.clone();
            let body = body.clone();
            async move {
                log.lock().unwrap().push(uri.to_string());
                Json(body)
            }
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn lookup_goes_through_the_proxy() {
        let (proxy, seen) = start_proxy(serde_json::json!({ "ip": "203.0.113.7" })).await;
        let lookup = IpifyLookup::new("http://ip.lookup.invalid/?format=json", Duration::from_secs(5));

        let ip = lookup.lookup(&proxy).await.unwrap();
        assert_eq!(ip, "203.0.113.7");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(
            seen[0].contains("ip.lookup.invalid"),
            "request must be sent to the proxy in absolute form, got: {}",
            seen[0]
        );
    }

    #[tokio::test]
    async fn malformed_body_is_a_proxy_check_failure() {
        let (proxy, _seen) = start_proxy(serde_json::json!({ "address": "x" })).await;
        let lookup = IpifyLookup::new("http://ip.lookup.invalid/", Duration::from_secs(5));

        let err = lookup.lookup(&proxy).await.unwrap_err();
        assert!(matches!(err, Error::ProxyCheck(_)));
    }

    #[tokio::test]
    async fn invalid_proxy_url_is_rejected() {
        let lookup = IpifyLookup::new(IPIFY_URL, Duration::from_secs(1));
        let err = lookup.lookup("not a proxy url").await.unwrap_err();
        assert!(matches!(err, Error::ProxyCheck(_)), "got: {err}");
    }

    #[tokio::test]
    async fn unreachable_proxy_fails() {
        let lookup = IpifyLookup::new(IPIFY_URL, Duration::from_secs(1));
        let err = lookup.lookup("http://127.0.0.1:9").await.unwrap_err();
        assert!(matches!(err, Error::ProxyCheck(_)));
    }
}
