//! Prometheus metrics
//!
//! The exporter is installed once per process as the global `metrics`
//! recorder, so the decision crate's facade sink lands here as well.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use sales_agent_decision::{DecisionRecord, FallbackKind};
use sales_agent_resilience::CircuitState;

use crate::state::AppState;
use crate::ServerError;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub const REQUESTS_TOTAL: &str = "sales_agent_http_requests_total";
pub const DECISIONS_TOTAL: &str = "sales_agent_decisions_total";
pub const DECISION_LATENCY_MS: &str = "sales_agent_decision_latency_ms";
pub const BREAKER_STATE: &str = "sales_agent_breaker_state";

/// Install the Prometheus recorder; later calls return the same handle
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| ServerError::Metrics(format!("Failed to install recorder: {}", e)))
        })
        .cloned()
}

pub fn record_request(endpoint: &'static str, status: StatusCode) {
    metrics::counter!(REQUESTS_TOTAL, "endpoint" => endpoint, "status" => status.as_u16().to_string())
        .increment(1);
}

pub fn record_decision(record: &DecisionRecord) {
    let fallback = match record.fallback_kind {
        Some(FallbackKind::Timeout) => "timeout",
        Some(FallbackKind::Error) => "error",
        None => "none",
    };
    metrics::counter!(
        DECISIONS_TOTAL,
        "mode" => record.optimization_mode.as_str(),
        "action" => record.action.clone(),
        "fallback" => fallback,
        "cached" => record.cached.to_string()
    )
    .increment(1);
    metrics::histogram!(DECISION_LATENCY_MS, "mode" => record.optimization_mode.as_str())
        .record(record.latency_ms);
}

/// 0 closed, 1 half-open, 2 open
fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

/// GET /metrics
///
/// Breaker state gauges are refreshed at scrape time.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    for (name, status) in state.registry.list_all() {
        metrics::gauge!(BREAKER_STATE, "breaker" => name).set(state_value(status.state));
    }

    match METRICS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
