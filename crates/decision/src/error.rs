//! Decision layer errors
//!
//! Only configuration errors escape `DecisionEngineBuilder::build`; the rest
//! are absorbed by the engine into fallback decisions.

use sales_agent_config::ConfigError;
use sales_agent_resilience::FailureKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecisionError {
    /// The prediction bundle exceeded its time budget
    #[error("Prediction gathering exceeded {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    /// Every configured predictor failed or was rejected
    #[error("All configured predictors failed")]
    PredictionsUnavailable,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DecisionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DecisionError::Timeout { .. })
    }
}

impl FailureKind for DecisionError {
    fn failure_kind(&self) -> &str {
        match self {
            DecisionError::Timeout { .. } => "timeout",
            DecisionError::PredictionsUnavailable => "predictions_unavailable",
            DecisionError::Config(_) => "config",
            DecisionError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, DecisionError>;
