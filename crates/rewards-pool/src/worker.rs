//! Worker unit: one account on its own task

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use common::Account;
use rewards_api::BoxFuture;

use crate::error::Result;
use crate::flow::Outcome;

/// Runs one account from setup to outcome.
pub trait AccountRunner: Send + Sync + 'static {
    fn run(&self, index: usize, account: Account) -> BoxFuture<'_, Result<Outcome>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Completed(Outcome),
    Failed(String),
    TimedOut(Duration),
    Panicked(String),
}

/// Exactly one per spawned worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub account_index: usize,
    pub result: WorkerResult,
}

impl WorkerReport {
    pub fn is_success(&self) -> bool {
        matches!(
            self.result,
            WorkerResult::Completed(Outcome::Finished | Outcome::Skipped)
        )
    }

    pub fn error(&self) -> Option<String> {
        match &self.result {
            WorkerResult::Completed(Outcome::Aborted) => Some("aborted".to_owned()),
            WorkerResult::Completed(_) => None,
            WorkerResult::Failed(e) => Some(e.clone()),
            WorkerResult::TimedOut(limit) => Some(format!("timed out after {}s", limit.as_secs())),
            WorkerResult::Panicked(msg) => Some(format!("worker panicked: {msg}")),
        }
    }

    /// Metric label for the run outcome.
    pub fn label(&self) -> &'static str {
        match &self.result {
            WorkerResult::Completed(outcome) => outcome.label(),
            WorkerResult::Failed(_) => "failed",
            WorkerResult::TimedOut(_) => "timeout",
            WorkerResult::Panicked(_) => "panic",
        }
    }
}

/// Run `account` on a fresh task, bounded by `time_box`.
///
/// Errors, timeouts and panics are all folded into the report; this never
/// fails and never panics itself.
pub async fn run_worker(
    runner: Arc<dyn AccountRunner>,
    index: usize,
    account: Account,
    time_box: Duration,
) -> WorkerReport {
    let handle = tokio::spawn(async move {
        tokio::time::timeout(time_box, runner.run(index, account)).await
    });

    let result = match handle.await {
        Ok(Ok(Ok(outcome))) => WorkerResult::Completed(outcome),
        Ok(Ok(Err(e))) => WorkerResult::Failed(e.to_string()),
        Ok(Err(_elapsed)) => WorkerResult::TimedOut(time_box),
        Err(join) if join.is_panic() => WorkerResult::Panicked(panic_message(join.into_panic())),
        Err(join) => WorkerResult::Failed(format!("worker cancelled: {join}")),
    };

    let report = WorkerReport {
        account_index: index,
        result,
    };
    metrics::counter!("rewards_account_runs_total", "outcome" => report.label()).increment(1);
    report
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
