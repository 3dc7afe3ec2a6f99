//! Status listener
//!
//! Optional, bound only when `admin.listen_addr` is set. Serves:
//! - GET /health: pass counters and the last pass summary
//! - GET /metrics: Prometheus text exposition

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use rewards_pool::SchedulerStatus;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    status: Arc<SchedulerStatus>,
    prometheus: PrometheusHandle,
    accounts: usize,
    started_at: Instant,
}

impl AdminState {
    pub fn new(status: Arc<SchedulerStatus>, prometheus: PrometheusHandle, accounts: usize) -> Self {
        Self {
            status,
            prometheus,
            accounts,
            started_at: Instant::now(),
        }
    }
}

/// Build the admin router. `max_connections` bounds concurrent requests.
pub fn build_admin_router(state: AdminState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let snapshot = state.status.snapshot().await;
    let body = serde_json::json!({
        "status": "running",
        "accounts": state.accounts,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "passes_completed": snapshot.passes_completed,
        "pass_running": snapshot.pass_running,
        "last_pass": snapshot.last_pass,
    });

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
