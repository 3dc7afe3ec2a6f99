//! Rewards farmer
//!
//! Single-binary service that:
//! 1. Loads accounts, proxies and the persisted token/fingerprint maps
//! 2. Resolves the API base URL (fixed or discovered)
//! 3. Runs every account through login, sync, tasks, check-in and ping in
//!    bounded batches, pass after pass, until SIGINT/SIGTERM

mod admin;
mod captcha;
mod config;
mod discovery;
mod error;
mod metrics;
mod proxy_ip;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rewards_auth::{SessionStore, TokenStore};
use rewards_pool::{RunnerContext, Scheduler, SessionRunner, preflight};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::{AdminState, build_admin_router};
use crate::captcha::SolverClient;
use crate::config::{Config, LogFormat};
use crate::proxy_ip::{IPIFY_URL, IpifyLookup};

/// Backoff unit for endpoint discovery retries.
const DISCOVERY_BACKOFF: Duration = Duration::from_secs(1);

/// How long the admin listener may take to drain after the scheduler stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

/// Log a startup failure and exit non-zero.
fn fatal(err: impl std::fmt::Display) -> ! {
    error!(error = %err, "fatal startup error");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(config.logging.format);
    info!(path = %config_path.display(), "starting rewards-farmer");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let account_lines = common::load_lines(&config.files.accounts).with_context(|| {
        format!("failed to read accounts from {}", config.files.accounts.display())
    })?;
    let proxies = if config.bot.use_proxy {
        common::load_lines(&config.files.proxies).with_context(|| {
            format!("failed to read proxies from {}", config.files.proxies.display())
        })?
    } else {
        Vec::new()
    };
    let accounts = common::parse_accounts(&account_lines, &proxies)
        .context("failed to parse account list")?;

    if let Err(e) = preflight(accounts.len(), proxies.len(), config.bot.use_proxy) {
        fatal(error::Error::from(e));
    }

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let captcha = match SolverClient::new(http.clone(), &config.captcha) {
        Ok(solver) => Arc::new(solver),
        Err(e) => fatal(e),
    };

    let sessions = SessionStore::load(
        config.files.user_agents.clone(),
        config.session.user_agents.clone(),
    )
    .await
    .with_context(|| format!("failed to load {}", config.files.user_agents.display()))?;
    let tokens = TokenStore::load(config.files.tokens.clone())
        .await
        .with_context(|| format!("failed to load {}", config.files.tokens.display()))?;

    // Every account gets its fingerprint before the first pass
    for account in &accounts {
        sessions.assign(&account.identifier).await;
    }

    let base_url = match discovery::resolve_base_url(&http, &config.api, DISCOVERY_BACKOFF).await {
        Ok(url) => url,
        Err(e) => fatal(e),
    };

    info!(
        accounts = accounts.len(),
        proxies = proxies.len(),
        use_proxy = config.bot.use_proxy,
        concurrency = config.concurrency(),
        cached_tokens = tokens.len().await,
        base_url = %base_url,
        "configuration loaded"
    );

    let [delay_min, delay_max] = config.bot.delay_start_bot;
    let runner = SessionRunner::new(RunnerContext {
        base_url,
        use_proxy: config.bot.use_proxy,
        start_delay: (delay_min, delay_max),
        request_timeout: config.request_timeout(),
        retry: config.retry_policy(),
        sessions: Arc::new(sessions),
        tokens: Arc::new(tokens),
        captcha,
        ip_lookup: Arc::new(IpifyLookup::new(IPIFY_URL, config.request_timeout())),
        settings: Arc::new(config.session_settings()),
    });

    let account_count = accounts.len();
    let scheduler = Scheduler::new(accounts, Arc::new(runner), config.scheduler_config());

    // Optional admin listener; drained once the scheduler stops
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let admin_handle = match config.admin.listen_addr {
        Some(addr) => {
            let app = build_admin_router(
                AdminState::new(scheduler.status(), prometheus_handle, account_count),
                config.admin.max_connections,
            );
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind admin listener to {addr}"))?;
            info!(addr = %addr, "admin listener ready");
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
            }))
        }
        None => None,
    };

    scheduler.run(shutdown_signal()).await;

    let _ = shutdown_tx.send(());
    if let Some(handle) = admin_handle {
        match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(error = %e, "admin listener error during shutdown"),
            Ok(Err(e)) => error!(error = %e, "admin listener task panicked"),
            Err(_) => warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "admin drain timeout exceeded, forcing shutdown"
            ),
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// A signal handler that cannot be installed never fires; the other one
/// still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
