//! API base URL resolution
//!
//! Either the configured `api.base_url`, or the `endpoint` field returned by
//! `api.discovery_url`. Discovery is retried with exponential backoff
//! (1s, 2s, 4s at the default unit) and is fatal once retries run out.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Retries after the first failed discovery request.
const MAX_DISCOVERY_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Delay before retry number `retries` (0-based), or `None` once exhausted.
pub fn retry_delay(retries: u32, unit: Duration) -> Option<Duration> {
    (retries < MAX_DISCOVERY_RETRIES).then(|| unit * 2u32.pow(retries))
}

/// Resolve the base URL every account talks to.
pub async fn resolve_base_url(
    client: &reqwest::Client,
    api: &ApiConfig,
    backoff_unit: Duration,
) -> Result<String> {
    if let Some(base_url) = &api.base_url {
        return Ok(base_url.clone());
    }
    let Some(discovery_url) = &api.discovery_url else {
        return Err(Error::EndpointDiscovery {
            attempts: 0,
            message: "no api.base_url or api.discovery_url configured".into(),
        });
    };

    let mut retries = 0;
    loop {
        match fetch_endpoint(client, discovery_url).await {
            Ok(endpoint) => {
                info!(endpoint = %endpoint, attempts = retries + 1, "API endpoint discovered");
                return Ok(endpoint);
            }
            Err(message) => match retry_delay(retries, backoff_unit) {
                Some(delay) => {
                    warn!(
                        error = %message,
                        retry_in_ms = delay.as_millis() as u64,
                        "endpoint discovery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                None => {
                    return Err(Error::EndpointDiscovery {
                        attempts: retries + 1,
                        message,
                    });
                }
            },
        }
    }
}

async fn fetch_endpoint(client: &reqwest::Client, url: &str) -> std::result::Result<String, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("discovery returned HTTP {}", status.as_u16()));
    }
    let body: DiscoveryResponse = response
        .json()
        .await
        .map_err(|e| format!("invalid discovery body: {e}"))?;

    if let Some(message) = body.message.as_deref().filter(|m| !m.is_empty()) {
        warn!(message, "discovery service message");
    }
    match body.endpoint {
        Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
            Ok(endpoint.trim_end_matches('/').to_owned())
        }
        Some(endpoint) if !endpoint.is_empty() => {
            Err(format!("discovered endpoint is not an http(s) URL: {endpoint}"))
        }
        _ => Err("discovery response carried no endpoint".into()),
    }
}
