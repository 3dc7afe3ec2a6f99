//! Multi-account execution engine
//!
//! Runs every configured account through the same sequence on a repeating
//! schedule:
//! 1. Acquire a bearer token (cached if still valid, otherwise CAPTCHA + login)
//! 2. Sync the profile; a failed sync skips the account for this pass
//! 3. Complete outstanding tasks (when enabled)
//! 4. Check in, at most once per local calendar day
//! 5. Ping the node endpoint, then sync again
//!
//! Accounts run in consecutive batches bounded by the concurrency limit.
//! Each account runs on its own task under a time box, so a hang, error or
//! panic in one account never reaches another.

pub mod calendar;
pub mod error;
pub mod flow;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod worker;

pub use calendar::checked_in_today;
pub use error::{Error, Result};
pub use flow::{AccountAction, AccountEvent, AccountState, Outcome, handle_event};
pub use runner::{IpLookup, RunnerContext, SessionRunner, start_delay};
pub use scheduler::{
    PassSummary, Scheduler, SchedulerConfig, SchedulerStatus, StatusSnapshot, batches,
    concurrency_limit, preflight,
};
pub use session::{AccountSession, SessionSettings, TaskSummary, pending_tasks};
pub use worker::{AccountRunner, WorkerReport, WorkerResult, run_worker};
