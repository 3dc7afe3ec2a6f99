//! Per-account session
//!
//! `AccountSession` owns one account's request client and drives the state
//! machine in [`crate::flow`]. Only a failure to obtain a token is fatal;
//! task, check-in and ping failures are logged and the run continues.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use common::Account;
use rewards_api::headers::EXTENSION_ORIGIN;
use rewards_api::{
    BoxFuture, CallOptions, CaptchaSolver, Endpoint, Error as ApiError, LoginData,
    Reauthenticate, RequestClient, Task, TaskCode, UserProfile,
};
use rewards_auth::{TokenStore, is_expired, now_unix};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::calendar::checked_in_today;
use crate::error::{Error, Result};
use crate::flow::{AccountAction, AccountEvent, AccountState, Outcome, handle_event};

/// Profile fetches per sync before the account is skipped.
const SYNC_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub auto_task: bool,
    pub skip_tasks: HashSet<String>,
    pub ping_origin: String,
    /// Pause after tasks, check-in and ping.
    pub step_delay: Duration,
    pub max_retries: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_task: true,
            skip_tasks: HashSet::new(),
            ping_origin: EXTENSION_ORIGIN.to_owned(),
            step_delay: Duration::from_secs(1),
            max_retries: 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
    pub completed: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Tasks still worth submitting: not reported done by the server and not in
/// the configured skip set.
pub fn pending_tasks<'a>(
    tasks: &'a [Task],
    completed: &[TaskCode],
    skip: &HashSet<String>,
) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| !completed.contains(&task.code) && !skip.contains(task.code.as_str()))
        .collect()
}

pub struct AccountSession {
    index: usize,
    account: Account,
    client: RequestClient,
    tokens: Arc<TokenStore>,
    captcha: Arc<dyn CaptchaSolver>,
    settings: Arc<SessionSettings>,
}

impl AccountSession {
    pub fn new(
        index: usize,
        account: Account,
        client: RequestClient,
        tokens: Arc<TokenStore>,
        captcha: Arc<dyn CaptchaSolver>,
        settings: Arc<SessionSettings>,
    ) -> Self {
        Self {
            index,
            account,
            client,
            tokens,
            captcha,
            settings,
        }
    }

    /// Run the full account sequence once.
    ///
    /// Returns `Finished` or `Skipped`; an aborted run is an
    /// [`Error::Authentication`].
    pub async fn run(&self) -> Result<Outcome> {
        let mut state = AccountState::Init;
        let mut event = AccountEvent::Start;
        let mut profile: Option<UserProfile> = None;
        let mut abort_reason = String::from("aborted");

        loop {
            if let AccountEvent::TokenFailed(reason) | AccountEvent::Fatal(reason) = &event {
                abort_reason = reason.clone();
            }
            let (next, action) = handle_event(state, event, self.settings.auto_task);
            state = next;

            event = match action {
                AccountAction::AcquireToken => match self.valid_token(false).await {
                    Ok(_) => AccountEvent::TokenAcquired,
                    Err(e) => {
                        warn!(error = %e, "can't get a valid token");
                        AccountEvent::TokenFailed(e.to_string())
                    }
                },
                AccountAction::Sync | AccountAction::FinalSync => match self.sync().await {
                    Ok(Some(synced)) => {
                        let checked_in =
                            checked_in_today(synced.last_checkin_at.as_ref(), Local::now());
                        profile = Some(synced);
                        AccountEvent::Synced {
                            checked_in_today: checked_in,
                        }
                    }
                    Ok(None) => {
                        if action == AccountAction::Sync {
                            warn!("can't sync profile, skipping account");
                        }
                        AccountEvent::SyncFailed
                    }
                    Err(e) => AccountEvent::Fatal(e.to_string()),
                },
                AccountAction::CompleteTasks => {
                    let completed = profile
                        .as_ref()
                        .map(|p| p.social_task.clone())
                        .unwrap_or_default();
                    let result = self.complete_tasks(&completed).await.map(|_| ());
                    self.after_step(result).await
                }
                AccountAction::Checkin => {
                    let result = self.checkin().await;
                    self.after_step(result).await
                }
                AccountAction::Ping => {
                    let result = self.ping().await;
                    self.after_step(result).await
                }
                AccountAction::Finish(Outcome::Aborted) => {
                    return Err(Error::Authentication(abort_reason));
                }
                AccountAction::Finish(outcome) => {
                    info!(
                        account = self.index + 1,
                        outcome = outcome.label(),
                        "account run complete"
                    );
                    return Ok(outcome);
                }
                AccountAction::None => {
                    warn!(state = ?state, "account flow stalled");
                    return Ok(Outcome::Skipped);
                }
            };
        }
    }

    async fn after_step(&self, result: Result<()>) -> AccountEvent {
        match result {
            Ok(()) => {
                tokio::time::sleep(self.settings.step_delay).await;
                AccountEvent::StepDone
            }
            Err(e) => AccountEvent::Fatal(e.to_string()),
        }
    }

    /// Return a usable bearer token, logging in when needed.
    ///
    /// The cached token is reused unless `force` is set or its JWT `exp` has
    /// passed. A new token is persisted to the token map and installed in the
    /// client before returning.
    pub async fn valid_token(&self, force: bool) -> Result<String> {
        if !force {
            let cached = match self.client.token().await {
                Some(token) => Some(token),
                None => self.tokens.get(&self.account.identifier).await,
            };
            if let Some(token) = cached {
                if !is_expired(&token, now_unix()) {
                    debug!("using cached token");
                    self.client.set_token(token.clone()).await;
                    return Ok(token);
                }
                info!("cached token expired");
            }
        }

        info!("requesting new token");
        let captcha = self
            .captcha
            .solve()
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;
        let payload = json!({
            "email": self.account.identifier,
            "password": self.account.credential.expose(),
            "captcha": captcha,
        });
        let response = self
            .client
            .send(Endpoint::Login, Some(&payload), &CallOptions::auth(), self)
            .await
            .map_err(|e| Error::Authentication(format!("login failed: {e}")))?;
        let login: LoginData = response
            .decode()
            .map_err(|e| Error::Authentication(format!("login response: {e}")))?;
        if login.access_token.is_empty() {
            return Err(Error::Authentication("login returned an empty token".into()));
        }

        if let Err(e) = self
            .tokens
            .save(&self.account.identifier, &login.access_token)
            .await
        {
            warn!(error = %e, "failed to persist token");
        }
        self.client.set_token(login.access_token.clone()).await;
        info!("obtained new token");
        Ok(login.access_token)
    }

    /// Fetch the profile, trying up to twice. `Ok(None)` means give up for
    /// this pass.
    pub async fn sync(&self) -> Result<Option<UserProfile>> {
        let options = CallOptions::retries(self.settings.max_retries);
        for attempt in 1..=SYNC_ATTEMPTS {
            let result = self
                .client
                .send(Endpoint::Me, None, &options, self)
                .await
                .and_then(|response| response.decode::<UserProfile>());
            match result {
                Ok(profile) => {
                    info!(
                        nodes = profile.nodes.len(),
                        today_points = %format!("{:.2}", profile.today_points()),
                        reward_points = %profile.reward_points(),
                        "synced profile"
                    );
                    return Ok(Some(profile));
                }
                Err(e) if e.is_fatal() => return Err(escalate(e)),
                Err(e) => warn!(attempt, error = %e, "profile sync failed"),
            }
        }
        Ok(None)
    }

    /// Submit every pending task in order. Each task's result is logged on
    /// its own; a rejected task does not stop the rest.
    pub async fn complete_tasks(&self, completed: &[TaskCode]) -> Result<TaskSummary> {
        let options = CallOptions::retries(self.settings.max_retries);
        let fetched = self
            .client
            .send(Endpoint::Tasks, None, &options, self)
            .await
            .and_then(|response| response.decode::<Vec<Task>>());
        let tasks = match fetched {
            Ok(tasks) => tasks,
            Err(e) if e.is_fatal() => return Err(escalate(e)),
            Err(e) => {
                warn!(error = %e, "can't get tasks");
                return Ok(TaskSummary::default());
            }
        };

        let pending = pending_tasks(&tasks, completed, &self.settings.skip_tasks);
        debug!(total = tasks.len(), pending = pending.len(), "fetched tasks");

        let mut summary = TaskSummary::default();
        for task in pending {
            let payload = json!({ "taskId": task.code.as_str() });
            match self
                .client
                .send(Endpoint::CompleteTask, Some(&payload), &options, self)
                .await
            {
                Ok(_) => {
                    info!(code = %task.code, title = %task.title, "task completed");
                    summary.completed += 1;
                    record_task("completed");
                }
                Err(ApiError::ExpectedRejection { message, .. }) => {
                    warn!(code = %task.code, title = %task.title, reason = %message, "task rejected");
                    summary.rejected += 1;
                    record_task("rejected");
                }
                Err(e) if e.is_fatal() => return Err(escalate(e)),
                Err(e) => {
                    warn!(code = %task.code, title = %task.title, error = %e, "task failed");
                    summary.failed += 1;
                    record_task("failed");
                }
            }
        }
        Ok(summary)
    }

    pub async fn checkin(&self) -> Result<()> {
        let options = CallOptions::retries(self.settings.max_retries);
        match self.client.send(Endpoint::Checkin, None, &options, self).await {
            Ok(_) => info!("checked in"),
            Err(e) if e.is_fatal() => return Err(escalate(e)),
            Err(e) => warn!(error = %e, "check-in failed"),
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let options = CallOptions::retries(self.settings.max_retries)
            .with_header("origin", self.settings.ping_origin.clone());
        let payload = json!({ "type": "extension" });
        match self
            .client
            .send(Endpoint::Ping, Some(&payload), &options, self)
            .await
        {
            Ok(_) => info!("ping sent"),
            Err(e) if e.is_fatal() => return Err(escalate(e)),
            Err(e) => warn!(error = %e, "ping failed"),
        }
        Ok(())
    }
}

impl Reauthenticate for AccountSession {
    fn reauthenticate(&self) -> BoxFuture<'_, rewards_api::Result<String>> {
        Box::pin(async move {
            self.valid_token(true)
                .await
                .map_err(|e| ApiError::Unauthorized(e.to_string()))
        })
    }
}

fn escalate(err: ApiError) -> Error {
    Error::Authentication(err.to_string())
}

fn record_task(result: &'static str) {
    metrics::counter!("rewards_tasks_total", "result" => result).increment(1);
}
