//! Sales Agent Server
//!
//! HTTP endpoints for the decision engine, circuit breaker administration and
//! Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod predictors;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, record_decision, record_request};
pub use predictors::RemotePredictor;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] sales_agent_config::ConfigError),

    #[error("Decision engine error: {0}")]
    Decision(#[from] sales_agent_decision::DecisionError),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Decision(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Metrics(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
