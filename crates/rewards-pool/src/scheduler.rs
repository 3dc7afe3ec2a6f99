//! Batch scheduler
//!
//! A pass walks the account list in consecutive batches of at most
//! `concurrency` accounts. Every account in a batch runs concurrently and the
//! whole batch is awaited before the next one starts. Passes repeat until
//! shutdown, with `pass_interval` between them.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use common::Account;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::worker::{AccountRunner, WorkerReport, run_worker};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub batch_cooldown: Duration,
    /// Pause after the last batch before the completion line is logged.
    pub pass_settle: Duration,
    pub pass_interval: Duration,
    pub account_timeout: Duration,
    /// Log every worker report at debug level.
    pub debug_reports: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub pass_id: String,
    pub accounts: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_secs: f64,
    pub finished_at: String,
}

/// Counters shared with the admin listener.
#[derive(Debug, Default)]
pub struct SchedulerStatus {
    passes_completed: AtomicU64,
    pass_running: AtomicBool,
    last_pass: RwLock<Option<PassSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub passes_completed: u64,
    pub pass_running: bool,
    pub last_pass: Option<PassSummary>,
}

impl SchedulerStatus {
    pub async fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            pass_running: self.pass_running.load(Ordering::Relaxed),
            last_pass: self.last_pass.read().await.clone(),
        }
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }
}

/// Split `n` accounts into consecutive ranges of at most `c`.
pub fn batches(n: usize, c: usize) -> Vec<Range<usize>> {
    let c = c.max(1);
    (0..n).step_by(c).map(|start| start..(start + c).min(n)).collect()
}

pub fn concurrency_limit(use_proxy: bool, max_threads: usize, max_threads_no_proxy: usize) -> usize {
    if use_proxy {
        max_threads
    } else {
        max_threads_no_proxy
    }
}

/// Startup check run before any worker spawns.
///
/// With proxying on, every account needs its own proxy line.
pub fn preflight(accounts: usize, proxies: usize, use_proxy: bool) -> Result<()> {
    if accounts == 0 {
        return Err(Error::NoAccounts);
    }
    if use_proxy && accounts > proxies {
        return Err(Error::ProxyShortage { accounts, proxies });
    }
    if !use_proxy {
        warn!("running without proxies");
    }
    Ok(())
}

pub struct Scheduler {
    accounts: Vec<Account>,
    runner: Arc<dyn AccountRunner>,
    config: SchedulerConfig,
    status: Arc<SchedulerStatus>,
}

impl Scheduler {
    pub fn new(accounts: Vec<Account>, runner: Arc<dyn AccountRunner>, config: SchedulerConfig) -> Self {
        Self {
            accounts,
            runner,
            config,
            status: Arc::new(SchedulerStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<SchedulerStatus> {
        self.status.clone()
    }

    /// Run every account once, batch by batch.
    pub async fn run_pass(&self) -> PassSummary {
        let pass_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let ranges = batches(self.accounts.len(), self.config.concurrency);
        self.status.pass_running.store(true, Ordering::Relaxed);
        info!(
            pass_id = %pass_id,
            accounts = self.accounts.len(),
            batches = ranges.len(),
            concurrency = self.config.concurrency,
            "starting pass"
        );

        let mut reports: Vec<WorkerReport> = Vec::with_capacity(self.accounts.len());
        for (batch, range) in ranges.into_iter().enumerate() {
            if batch > 0 {
                tokio::time::sleep(self.config.batch_cooldown).await;
            }
            let workers = range.map(|index| {
                run_worker(
                    self.runner.clone(),
                    index,
                    self.accounts[index].clone(),
                    self.config.account_timeout,
                )
            });
            for report in join_all(workers).await {
                self.log_report(&report);
                reports.push(report);
            }
        }

        let succeeded = reports.iter().filter(|r| r.is_success()).count();
        let elapsed = started.elapsed();
        metrics::histogram!("rewards_pass_duration_seconds").record(elapsed.as_secs_f64());

        let summary = PassSummary {
            pass_id,
            accounts: reports.len(),
            succeeded,
            failed: reports.len() - succeeded,
            duration_secs: elapsed.as_secs_f64(),
            finished_at: chrono::Local::now().to_rfc3339(),
        };
        self.status.pass_running.store(false, Ordering::Relaxed);
        self.status.passes_completed.fetch_add(1, Ordering::Relaxed);
        *self.status.last_pass.write().await = Some(summary.clone());
        summary
    }

    /// Repeat passes until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let summary = tokio::select! {
                _ = &mut shutdown => break,
                summary = self.run_pass() => summary,
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.pass_settle) => {}
            }
            info!(
                pass_id = %summary.pass_id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                duration_secs = summary.duration_secs,
                next_in_mins = self.config.pass_interval.as_secs() / 60,
                "pass complete"
            );

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.pass_interval) => {}
            }
        }
        info!("scheduler stopped");
    }

    fn log_report(&self, report: &WorkerReport) {
        if let Some(error) = report.error() {
            warn!(account = report.account_index + 1, error = %error, "account run failed");
        } else if self.config.debug_reports {
            debug!(account = report.account_index + 1, outcome = report.label(), "account run finished");
        }
    }
}
