//! HTTP Endpoints
//!
//! REST API for the decision engine and its breakers.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use sales_agent_config::constants::breakers;
use sales_agent_core::{ConversationContext, CustomerProfile, Message};
use sales_agent_decision::{DecisionRecord, EngineMetrics, StrategyKind};
use sales_agent_resilience::{BreakerStatus, CircuitState};

use crate::metrics::{metrics_handler, record_decision, record_request};
use crate::state::AppState;
use crate::ServerError;

/// Upper bound on any request, decisions included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        // Decisions
        .route("/api/decision", post(make_decision))
        .route("/api/decision/metrics", get(engine_metrics))
        .route("/api/decision/cache/clear", post(clear_cache))
        // Strategy weights
        .route("/api/strategies/weights", get(strategy_weights))
        .route("/api/strategies/performance", post(report_performance))
        // Breakers
        .route("/api/breakers", get(list_breakers))
        .route("/api/breakers/:name", get(get_breaker))
        .route("/admin/breakers/reset", post(reset_breakers))
        .route("/admin/breakers/:name/reset", post(reset_breaker))
        .route("/admin/reload-config", post(reload_config))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

const CORS_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];
const DEV_ORIGIN: &str = "http://localhost:3000";

/// Origins that parse as header values; invalid entries are logged and dropped
fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            },
        })
        .collect()
}

/// CORS for the decision API
///
/// Disabled means permissive. With no usable origins only the local
/// dashboard origin is allowed.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS disabled, allowing every origin");
        return CorsLayer::permissive();
    }

    let mut allowed = parse_origins(origins);
    if allowed.is_empty() {
        tracing::info!(origin = DEV_ORIGIN, "No usable CORS origins configured");
        allowed.push(HeaderValue::from_static(DEV_ORIGIN));
    } else {
        tracing::info!(count = allowed.len(), "CORS origins configured");
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(CORS_METHODS)
        .allow_headers(Any)
}

/// Decision request body
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub profile: CustomerProfile,
    /// Caller-computed context; derived from the messages when absent
    #[serde(default)]
    pub context: Option<ConversationContext>,
}

/// POST /api/decision
async fn make_decision(
    State(state): State<AppState>,
    Json(request): Json<DecisionRequest>,
) -> Json<DecisionRecord> {
    let engine = state.engine();
    let record = engine
        .make_decision(&request.messages, &request.profile, request.context.as_ref())
        .await;

    record_decision(&record);
    record_request("decision", StatusCode::OK);
    Json(record)
}

/// GET /api/decision/metrics
async fn engine_metrics(State(state): State<AppState>) -> Json<EngineMetrics> {
    Json(state.engine().get_metrics())
}

/// POST /api/decision/cache/clear
async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.engine().clear_cache();
    tracing::info!("Decision cache cleared");
    Json(serde_json::json!({ "status": "success" }))
}

/// GET /api/strategies/weights
async fn strategy_weights(State(state): State<AppState>) -> Json<BTreeMap<StrategyKind, f32>> {
    Json(state.engine().strategy_weights())
}

/// Observed performance per strategy name, each in [0, 1]
#[derive(Debug, Deserialize)]
pub struct PerformanceReport {
    pub performance: HashMap<String, f32>,
}

/// POST /api/strategies/performance
///
/// Unknown strategy names or out-of-range values reject the whole report.
async fn report_performance(
    State(state): State<AppState>,
    Json(report): Json<PerformanceReport>,
) -> Result<Json<BTreeMap<StrategyKind, f32>>, ServerError> {
    let mut performance = HashMap::with_capacity(report.performance.len());
    for (name, value) in report.performance {
        let kind: StrategyKind = name
            .parse()
            .map_err(|e| ServerError::InvalidRequest(format!("{}", e)))?;
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ServerError::InvalidRequest(format!(
                "Performance for '{}' must be within [0, 1], got {}",
                name, value
            )));
        }
        performance.insert(kind, value);
    }

    let weights = state.engine().adapt_strategy_weights(&performance);
    record_request("strategy_performance", StatusCode::OK);
    Ok(Json(weights))
}

/// GET /api/breakers
async fn list_breakers(State(state): State<AppState>) -> Json<BTreeMap<String, BreakerStatus>> {
    Json(state.registry.list_all())
}

/// GET /api/breakers/:name
async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, ServerError> {
    state
        .registry
        .get(&name)
        .map(|breaker| Json(breaker.status()))
        .ok_or_else(|| ServerError::NotFound(format!("Breaker '{}'", name)))
}

/// POST /admin/breakers/reset
async fn reset_breakers(State(state): State<AppState>) -> impl IntoResponse {
    state.registry.reset_all();
    Json(serde_json::json!({
        "status": "success",
        "reset": state.registry.len(),
    }))
}

/// POST /admin/breakers/:name/reset
async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, ServerError> {
    let breaker = state
        .registry
        .get(&name)
        .ok_or_else(|| ServerError::NotFound(format!("Breaker '{}'", name)))?;
    breaker.reset();
    Ok(Json(breaker.status()))
}

/// POST /admin/reload-config
async fn reload_config(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    state.reload_config()?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Configuration reloaded successfully"
    })))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    version: &'static str,
    configured_predictors: usize,
    open_breakers: Vec<String>,
}

/// GET /health
///
/// Always 200; open breakers report the service as degraded.
async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let open_breakers: Vec<String> = state
        .registry
        .list_all()
        .into_iter()
        .filter(|(_, status)| status.state != CircuitState::Closed)
        .map(|(name, _)| name)
        .collect();

    Json(HealthReport {
        status: if open_breakers.is_empty() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        configured_predictors: state.engine().get_metrics().configured_predictors,
        open_breakers,
    })
}

/// GET /ready
///
/// 503 while the decision engine breaker rejects calls.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let engine_state = state
        .registry
        .get(breakers::DECISION_ENGINE)
        .map(|breaker| breaker.state());

    match engine_state {
        Some(CircuitState::Open) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false, "reason": "decision engine breaker open" })),
        ),
        _ => (StatusCode::OK, Json(serde_json::json!({ "ready": true }))),
    }
}
