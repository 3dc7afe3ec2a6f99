//! Per-account setup before the session runs
//!
//! Assigns the account's fingerprint, builds its HTTP client (through its
//! proxy when proxying is on), verifies the proxy's exit IP and staggers the
//! start. Everything an account does is logged inside an `account` span.

use std::sync::Arc;
use std::time::Duration;

use common::Account;
use rand::RngExt;
use rewards_api::{BoxFuture, CaptchaSolver, ClientConfig, RequestClient, RetryPolicy};
use rewards_auth::{SessionStore, TokenStore};
use tracing::{Instrument, info, info_span, warn};

use crate::error::{Error, Result};
use crate::flow::Outcome;
use crate::session::{AccountSession, SessionSettings};
use crate::worker::AccountRunner;

/// Resolves the public IP seen through a proxy.
pub trait IpLookup: Send + Sync {
    fn lookup<'a>(&'a self, proxy_url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Shared, immutable inputs for every account run.
pub struct RunnerContext {
    pub base_url: String,
    pub use_proxy: bool,
    /// Start delay range in seconds, applied when proxying.
    pub start_delay: (u64, u64),
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenStore>,
    pub captcha: Arc<dyn CaptchaSolver>,
    pub ip_lookup: Arc<dyn IpLookup>,
    pub settings: Arc<SessionSettings>,
}

pub struct SessionRunner {
    ctx: RunnerContext,
}

impl SessionRunner {
    pub fn new(ctx: RunnerContext) -> Self {
        Self { ctx }
    }

    async fn run_account(&self, index: usize, account: Account) -> Result<Outcome> {
        let user_agent = self.ctx.sessions.assign(&account.identifier).await;
        let proxy = if self.ctx.use_proxy {
            Some(
                account
                    .proxy
                    .clone()
                    .ok_or_else(|| Error::ProxyCheck("no proxy assigned".into()))?,
            )
        } else {
            None
        };

        let client = RequestClient::new(ClientConfig {
            base_url: self.ctx.base_url.clone(),
            user_agent,
            proxy: proxy.clone(),
            timeout: self.ctx.request_timeout,
            retry: self.ctx.retry.clone(),
        })
        .map_err(|e| Error::Client(e.to_string()))?;

        if let Some(proxy_url) = &proxy {
            let ip = self
                .ctx
                .ip_lookup
                .lookup(proxy_url)
                .await
                .inspect_err(|e| warn!(error = %e, "cannot check proxy IP"))?;
            tracing::Span::current().record("ip", ip.as_str());

            let delay = start_delay(self.ctx.start_delay);
            info!(ip = %ip, delay_secs = delay.as_secs(), "starting after delay");
            tokio::time::sleep(delay).await;
        }

        let session = AccountSession::new(
            index,
            account,
            client,
            self.ctx.tokens.clone(),
            self.ctx.captcha.clone(),
            self.ctx.settings.clone(),
        );
        session.run().await
    }
}

impl AccountRunner for SessionRunner {
    fn run(&self, index: usize, account: Account) -> BoxFuture<'_, Result<Outcome>> {
        let span = info_span!(
            "account",
            account = index + 1,
            email = %account.identifier,
            ip = tracing::field::Empty,
        );
        Box::pin(self.run_account(index, account).instrument(span))
    }
}

/// Uniform random delay within `(min, max)` seconds, inclusive.
pub fn start_delay((min, max): (u64, u64)) -> Duration {
    if max <= min {
        return Duration::from_secs(min);
    }
    Duration::from_secs(rand::rng().random_range(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoCaptcha;

    impl CaptchaSolver for NoCaptcha {
        fn solve(&self) -> BoxFuture<'_, rewards_api::Result<String>> {
            Box::pin(async { Err(rewards_api::Error::Captcha("disabled".into())) })
        }
    }

    struct FailingLookup(AtomicUsize);

    impl IpLookup for FailingLookup {
        fn lookup<'a>(&'a self, _proxy_url: &'a str) -> BoxFuture<'a, Result<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(Error::ProxyCheck("proxy refused connection".into())) })
        }
    }

    async fn context(dir: &tempfile::TempDir, use_proxy: bool) -> (RunnerContext, Arc<FailingLookup>) {
        let lookup = Arc::new(FailingLookup(AtomicUsize::new(0)));
        let ctx = RunnerContext {
            base_url: "http://127.0.0.1:9".into(),
            use_proxy,
            start_delay: (0, 0),
            request_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                rate_limit_cooldown: Duration::from_millis(1),
                retry_delay: Duration::from_millis(1),
            },
            sessions: Arc::new(
                SessionStore::load(dir.path().join("ua.json"), Vec::new())
                    .await
                    .unwrap(),
            ),
            tokens: Arc::new(TokenStore::load(dir.path().join("tokens.json")).await.unwrap()),
            captcha: Arc::new(NoCaptcha),
            ip_lookup: lookup.clone(),
            settings: Arc::new(SessionSettings::default()),
        };
        (ctx, lookup)
    }

    fn account(proxy: Option<&str>) -> Account {
        Account {
            identifier: "a@x.io".into(),
            credential: "pw".into(),
            proxy: proxy.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn proxy_check_failure_aborts_before_login() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, lookup) = context(&dir, true).await;
        let runner = SessionRunner::new(ctx);

        let err = runner
            .run(0, account(Some("http://10.0.0.1:8080")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProxyCheck(_)));
        assert_eq!(lookup.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn proxying_without_assigned_proxy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, lookup) = context(&dir, true).await;
        let runner = SessionRunner::new(ctx);

        let err = runner.run(0, account(None)).await.unwrap_err();
        assert!(matches!(err, Error::ProxyCheck(_)));
        assert_eq!(lookup.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fingerprint_is_assigned_before_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, lookup) = context(&dir, false).await;
        let sessions = ctx.sessions.clone();
        let runner = SessionRunner::new(ctx);

        // No proxy: the lookup is skipped and the run fails at the captcha
        let err = runner.run(0, account(None)).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(lookup.0.load(Ordering::SeqCst), 0);
        assert!(sessions.user_agent("a@x.io").await.is_some());
    }

    #[test]
    fn start_delay_stays_in_range() {
        for _ in 0..50 {
            let delay = start_delay((2, 5)).as_secs();
            assert!((2..=5).contains(&delay));
        }
        assert_eq!(start_delay((7, 3)), Duration::from_secs(7));
    }
}
