//! Prometheus metrics exposition
//!
//! The library crates emit through the `metrics` facade:
//!
//! - `rewards_requests_total` (counter): labels `endpoint`, `status`
//! - `rewards_request_duration_seconds` (histogram): label `endpoint`
//! - `rewards_account_runs_total` (counter): label `outcome`
//! - `rewards_tasks_total` (counter): label `result`
//! - `rewards_pass_duration_seconds` (histogram)
//!
//! This binary adds its own startup-side series:
//!
//! - `rewards_captcha_solves_total` (counter): label `result`
//! - `rewards_captcha_solve_duration_seconds` (histogram)
//! - `rewards_proxy_checks_total` (counter): label `result`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const REQUEST_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// A pass spans minutes to hours once start delays and cooldowns add up.
const PASS_BUCKETS: &[f64] = &[
    10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 21600.0,
];

const CAPTCHA_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("rewards_request_duration_seconds".to_string()),
            REQUEST_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("rewards_pass_duration_seconds".to_string()),
            PASS_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("rewards_captcha_solve_duration_seconds".to_string()),
            CAPTCHA_BUCKETS,
        )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Duration series are configured with explicit buckets so they render as
/// Prometheus histograms (`_bucket` lines) rather than summaries.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record one CAPTCHA solve attempt.
pub fn record_captcha_solve(success: bool, duration_secs: f64) {
    let result = if success { "solved" } else { "failed" };
    metrics::counter!("rewards_captcha_solves_total", "result" => result).increment(1);
    metrics::histogram!("rewards_captcha_solve_duration_seconds").record(duration_secs);
}

pub fn record_proxy_check(success: bool) {
    let result = if success { "ok" } else { "failed" };
    metrics::counter!("rewards_proxy_checks_total", "result" => result).increment(1);
}
