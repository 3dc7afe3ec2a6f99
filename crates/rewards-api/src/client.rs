//! HTTP client for one account
//!
//! Each account gets its own `RequestClient`: its own fingerprint headers,
//! optional outbound proxy and bearer token. `send` runs one logical call
//! through the retry policy:
//!
//! 1. 429 waits the rate-limit cooldown before the regular retry delay.
//! 2. 401 on a non-auth call re-authenticates once and replays the request
//!    without spending an attempt. A failed re-authentication ends the call
//!    with [`Error::Unauthorized`]; a second 401 is an ordinary failure.
//! 3. 400 on task completion returns [`Error::ExpectedRejection`] at once.
//! 4. Anything else is retried after the retry delay, up to
//!    `max_retries + 1` attempts in total.

use std::time::{Duration, Instant};

use common::Secret;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::classify::{Failure, classify};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::{Reauthenticate, headers};

const MAX_MESSAGE_LEN: usize = 200;

/// Delays applied between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rate_limit_cooldown: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_secs(60),
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Outbound proxy URL (`http://`, `https://` or `socks5://`).
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: user_agent.into(),
            proxy: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-call knobs.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub max_retries: u32,
    /// Login and other calls that must not carry or refresh a bearer token.
    pub is_auth_call: bool,
    pub extra_headers: Vec<(String, String)>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            is_auth_call: false,
            extra_headers: Vec::new(),
        }
    }
}

impl CallOptions {
    pub fn retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn auth() -> Self {
        Self {
            is_auth_call: true,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

/// Successful response after envelope unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
}

impl ApiResponse {
    /// Unwrap the `{statusCode, metadata}` envelope when `metadata` carries
    /// a value. A `null`, `false`, zero or empty-string `metadata` leaves the
    /// body as is.
    pub fn from_body(http_status: u16, body: Value) -> Self {
        match body {
            Value::Object(mut map) if map.get("metadata").is_some_and(is_truthy) => {
                let status = map
                    .get("statusCode")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(http_status);
                let data = map.remove("metadata").unwrap_or(Value::Null);
                Self { status, data }
            }
            other => Self {
                status: http_status,
                data: other,
            },
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(|e| Error::Decode(e.to_string()))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

struct Failed {
    status: Option<u16>,
    message: String,
}

pub struct RequestClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    retry: RetryPolicy,
    token: RwLock<Option<Secret<String>>>,
}

impl RequestClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| Error::Config(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url,
            headers: headers::fingerprint_headers(&config.user_agent)?,
            retry: config.retry,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn token(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| t.expose().clone())
    }

    pub async fn set_token(&self, token: String) {
        *self.token.write().await = Some(Secret::new(token));
    }

    /// Perform one logical call against `endpoint`.
    ///
    /// `body` is sent as JSON on POST endpoints (`{}` when absent).
    pub async fn send(
        &self,
        endpoint: Endpoint,
        body: Option<&Value>,
        options: &CallOptions,
        reauth: &dyn Reauthenticate,
    ) -> Result<ApiResponse> {
        let url = endpoint.url(&self.base_url);
        let mut failures = 0u32;
        let mut replayed = false;

        loop {
            let headers = self.headers_for(options).await?;
            let started = Instant::now();
            let outcome = self.attempt(endpoint, &url, headers, body).await;
            let status = match &outcome {
                Ok(response) => Some(response.status),
                Err(failed) => failed.status,
            };
            record_attempt(endpoint, status, started.elapsed());

            let Failed { status, message } = match outcome {
                Ok(response) => return Ok(response),
                Err(failed) => failed,
            };
            let failure = classify(status, endpoint);

            if failure == Failure::Unauthorized && !options.is_auth_call && !replayed {
                warn!(endpoint = endpoint.label(), "token rejected, re-authenticating");
                let token = reauth.reauthenticate().await.map_err(|e| match e {
                    Error::Unauthorized(msg) => Error::Unauthorized(msg),
                    other => Error::Unauthorized(other.to_string()),
                })?;
                self.set_token(token).await;
                replayed = true;
                continue;
            }

            if failure == Failure::ExpectedRejection {
                debug!(endpoint = endpoint.label(), error = %message, "request rejected");
                return Err(Error::ExpectedRejection {
                    status: status.unwrap_or(400),
                    message,
                });
            }

            failures += 1;
            if failures > options.max_retries {
                warn!(
                    endpoint = endpoint.label(),
                    status,
                    attempts = failures,
                    error = %message,
                    "request failed, giving up"
                );
                return Err(match failure {
                    Failure::RateLimited => Error::RateLimited { attempts: failures },
                    Failure::Network => Error::Network(message),
                    _ => Error::RetriesExhausted {
                        status,
                        attempts: failures,
                        message,
                    },
                });
            }

            if failure == Failure::RateLimited {
                warn!(
                    endpoint = endpoint.label(),
                    cooldown_secs = self.retry.rate_limit_cooldown.as_secs(),
                    "rate limited, cooling down"
                );
                tokio::time::sleep(self.retry.rate_limit_cooldown).await;
            }
            warn!(
                endpoint = endpoint.label(),
                status,
                attempt = failures,
                error = %message,
                "request failed, retrying"
            );
            tokio::time::sleep(self.retry.retry_delay).await;
        }
    }

    async fn headers_for(&self, options: &CallOptions) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        headers::inject_extra(&mut headers, &options.extra_headers);
        if !options.is_auth_call {
            if let Some(token) = self.token.read().await.as_ref() {
                headers::set_bearer(&mut headers, token.expose())?;
            }
        }
        Ok(headers)
    }

    async fn attempt(
        &self,
        endpoint: Endpoint,
        url: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> std::result::Result<ApiResponse, Failed> {
        let method = endpoint.method();
        let mut request = self.http.request(method.clone(), url).headers(headers);
        if method == Method::POST {
            let empty = Value::Object(Default::default());
            request = request.json(body.unwrap_or(&empty));
        }

        let response = request.send().await.map_err(|e| Failed {
            status: None,
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| Failed {
            status: Some(status),
            message: format!("failed to read response body: {e}"),
        })?;

        let parsed = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if (200..300).contains(&status) {
            Ok(ApiResponse::from_body(status, parsed))
        } else {
            Err(Failed {
                status: Some(status),
                message: error_message(&parsed, status),
            })
        }
    }
}

/// Pick a human-readable message out of an error body: `message`, then
/// `error`, then the raw text.
fn error_message(body: &Value, status: u16) -> String {
    let field = |key: &str| match body.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    };
    let message = field("message")
        .or_else(|| field("error"))
        .or_else(|| match body {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            _ => None,
        })
        .unwrap_or_else(|| format!("HTTP {status}"));
    message.chars().take(MAX_MESSAGE_LEN).collect()
}

fn record_attempt(endpoint: Endpoint, status: Option<u16>, elapsed: Duration) {
    let status = status.map_or_else(|| "network".to_owned(), |s| s.to_string());
    metrics::counter!(
        "rewards_requests_total",
        "endpoint" => endpoint.label(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!("rewards_request_duration_seconds", "endpoint" => endpoint.label())
        .record(elapsed.as_secs_f64());
}
