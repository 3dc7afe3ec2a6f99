//! CAPTCHA solver client
//!
//! Talks to a createTask/getTaskResult solving service: one `createTask`
//! submission, then `getTaskResult` polls until the task is ready, the
//! service reports an error, or the solve deadline passes.

use std::time::{Duration, Instant};

use common::Secret;
use rewards_api::{BoxFuture, CaptchaSolver};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::CaptchaConfig;
use crate::error::{Error, Result};
use crate::metrics;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    task_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Solution {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    g_recaptcha_response: Option<String>,
}

impl Solution {
    fn into_token(self) -> Option<String> {
        self.token
            .or(self.g_recaptcha_response)
            .filter(|t| !t.is_empty())
    }
}

pub struct SolverClient {
    http: reqwest::Client,
    solver_url: String,
    api_key: Secret<String>,
    task: Value,
    poll_interval: Duration,
    timeout: Duration,
}

impl SolverClient {
    pub fn new(http: reqwest::Client, config: &CaptchaConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or(Error::MissingCaptchaKey)?;
        Ok(Self {
            http,
            solver_url: config.solver_url.trim_end_matches('/').to_owned(),
            api_key,
            task: json!({
                "type": config.task_type,
                "websiteURL": config.website_url,
                "websiteKey": config.website_key,
            }),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Shrink the poll interval, for tests against a local mock.
    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, method: &str, body: Value) -> rewards_api::Result<T> {
        let url = format!("{}/{method}", self.solver_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| rewards_api::Error::Captcha(format!("{method}: {e}")))?;
        if !response.status().is_success() {
            return Err(rewards_api::Error::Captcha(format!(
                "{method} returned HTTP {}",
                response.status().as_u16()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| rewards_api::Error::Captcha(format!("{method}: invalid body: {e}")))
    }

    async fn solve_once(&self) -> rewards_api::Result<String> {
        let created: CreateTaskResponse = self
            .post(
                "createTask",
                json!({ "clientKey": self.api_key.expose(), "task": self.task }),
            )
            .await?;
        if created.error_id != 0 {
            return Err(service_error("createTask", created.error_description));
        }
        let task_id = created
            .task_id
            .ok_or_else(|| rewards_api::Error::Captcha("createTask returned no taskId".into()))?;
        debug!(task_id = %task_id, "CAPTCHA task created");

        let deadline = Instant::now() + self.timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let result: TaskResultResponse = self
                .post(
                    "getTaskResult",
                    json!({ "clientKey": self.api_key.expose(), "taskId": task_id }),
                )
                .await?;
            if result.error_id != 0 {
                return Err(service_error("getTaskResult", result.error_description));
            }
            if result.status.as_deref() == Some("ready") {
                return result
                    .solution
                    .and_then(Solution::into_token)
                    .ok_or_else(|| rewards_api::Error::Captcha("ready task carried no token".into()));
            }
            if Instant::now() >= deadline {
                return Err(rewards_api::Error::Captcha(format!(
                    "not solved within {}s",
                    self.timeout.as_secs()
                )));
            }
        }
    }
}

fn service_error(method: &str, description: Option<String>) -> rewards_api::Error {
    rewards_api::Error::Captcha(format!(
        "{method}: {}",
        description.unwrap_or_else(|| "solver reported an error".into())
    ))
}

impl CaptchaSolver for SolverClient {
    fn solve(&self) -> BoxFuture<'_, rewards_api::Result<String>> {
        Box::pin(async move {
            let started = Instant::now();
            let result = self.solve_once().await;
            metrics::record_captcha_solve(result.is_ok(), started.elapsed().as_secs_f64());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::extract::State;
    use axum::routing::post;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Clone)]
    struct Solver {
        /// `getTaskResult` polls answered "processing" before "ready".
        pending_polls: usize,
        create_error: bool,
        polls: Arc<AtomicUsize>,
        last_create: Arc<std::sync::Mutex<Option<Value>>>,
    }

    async fn create_task(State(s): State<Solver>, Json(body): Json<Value>) -> Json<Value> {
        *s.last_create.lock().unwrap() = Some(body);
        if s.create_error {
            return Json(json!({ "errorId": 1, "errorDescription": "ERROR_KEY_DOES_NOT_EXIST" }));
        }
        Json(json!({ "errorId": 0, "taskId": 7341 }))
    }

    async fn task_result(State(s): State<Solver>, Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["taskId"], 7341);
        let n = s.polls.fetch_add(1, Ordering::SeqCst);
        if n < s.pending_polls {
            return Json(json!({ "errorId": 0, "status": "processing" }));
        }
        Json(json!({ "errorId": 0, "status": "ready", "solution": { "token": "0.solved-token" } }))
    }

    async fn start_solver(pending_polls: usize, create_error: bool) -> (String, Solver) {
        let state = Solver {
            pending_polls,
            create_error,
            polls: Arc::new(AtomicUsize::new(0)),
            last_create: Arc::new(std::sync::Mutex::new(None)),
        };
        let app = axum::Router::new()
            .route("/createTask", post(create_task))
            .route("/getTaskResult", post(task_result))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), state)
    }

    fn config(solver_url: &str, api_key: Option<&str>, timeout_secs: u64) -> CaptchaConfig {
        CaptchaConfig {
            solver_url: solver_url.to_owned(),
            website_url: "https://dashboard.rewards.example".into(),
            website_key: "0x4AAAAAAA".into(),
            task_type: "TurnstileTaskProxyless".into(),
            poll_interval_secs: 1,
            timeout_secs,
            api_key: api_key.map(Secret::from),
            api_key_file: None,
        }
    }

    fn client(config: &CaptchaConfig) -> SolverClient {
        SolverClient::new(reqwest::Client::new(), config)
            .unwrap()
            .with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn polls_until_ready() {
        let (url, state) = start_solver(2, false).await;
        let solver = client(&config(&url, Some("key-1"), 30));

        let token = solver.solve().await.unwrap();
        assert_eq!(token, "0.solved-token");
        assert_eq!(state.polls.load(Ordering::SeqCst), 3);

        let create = state.last_create.lock().unwrap().clone().unwrap();
        assert_eq!(create["clientKey"], "key-1");
        assert_eq!(create["task"]["type"], "TurnstileTaskProxyless");
        assert_eq!(create["task"]["websiteKey"], "0x4AAAAAAA");
    }

    #[tokio::test]
    async fn service_error_is_reported() {
        let (url, state) = start_solver(0, true).await;
        let solver = client(&config(&url, Some("bad"), 30));

        let err = solver.solve().await.unwrap_err();
        assert!(err.to_string().contains("ERROR_KEY_DOES_NOT_EXIST"), "got: {err}");
        assert_eq!(state.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gives_up_at_deadline() {
        let (url, _state) = start_solver(usize::MAX, false).await;
        let solver = client(&config(&url, Some("key"), 0));

        let err = solver.solve().await.unwrap_err();
        assert!(err.to_string().contains("not solved within"), "got: {err}");
    }

    #[test]
    fn missing_key_is_rejected() {
        let result = SolverClient::new(reqwest::Client::new(), &config("http://127.0.0.1:9", None, 30));
        assert!(matches!(result, Err(Error::MissingCaptchaKey)));
    }
}
