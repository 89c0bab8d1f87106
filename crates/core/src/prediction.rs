//! Predictor collaborator traits
//!
//! The decision layer consumes three independent predictors. Each takes the
//! conversation identifier, the messages so far and the customer profile, and
//! returns a structured result. Implementations (remote model services,
//! heuristics, test doubles) are pluggable; any of them may be absent, in which
//! case the orchestrator uses the documented default for that field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::{CustomerProfile, Message};

/// The three prediction fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    Conversion,
    Objections,
    Needs,
}

impl PredictionKind {
    pub const ALL: [PredictionKind; 3] = [
        PredictionKind::Conversion,
        PredictionKind::Objections,
        PredictionKind::Needs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionKind::Conversion => "conversion",
            PredictionKind::Objections => "objections",
            PredictionKind::Needs => "needs",
        }
    }
}

impl std::fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion likelihood estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionEstimate {
    /// Probability in [0, 1]
    pub probability: f32,
}

impl ConversionEstimate {
    pub fn new(probability: f32) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

/// An objection the customer raised or is likely to raise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObjection {
    /// Objection tag, e.g. `price`, `trust`, `timing`, `competitor`
    pub kind: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl DetectedObjection {
    pub fn new(kind: impl Into<String>, confidence: f32) -> Self {
        Self {
            kind: kind.into(),
            confidence,
        }
    }
}

/// A customer need tag, e.g. `roi`, `growth`, `support`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedNeed {
    pub tag: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl DetectedNeed {
    pub fn new(tag: impl Into<String>, confidence: f32) -> Self {
        Self {
            tag: tag.into(),
            confidence,
        }
    }
}

fn default_confidence() -> f32 {
    1.0
}

/// Predictor failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Predictor backend error: {0}")]
    Backend(String),

    #[error("Predictor timed out")]
    Timeout,

    #[error("Invalid predictor response: {0}")]
    InvalidResponse(String),

    #[error("Predictor unavailable: {0}")]
    Unavailable(String),

    /// The request itself was malformed; the predictor is healthy
    #[error("Invalid prediction input: {0}")]
    InvalidInput(String),
}

impl PredictionError {
    /// Stable kind tag, used for breaker failure classification
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::Backend(_) => "backend",
            PredictionError::Timeout => "timeout",
            PredictionError::InvalidResponse(_) => "invalid_response",
            PredictionError::Unavailable(_) => "unavailable",
            PredictionError::InvalidInput(_) => "invalid_input",
        }
    }
}

/// Predicts how likely the conversation is to convert
#[async_trait]
pub trait ConversionPredictor: Send + Sync {
    async fn predict_conversion(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<ConversionEstimate, PredictionError>;
}

/// Predicts the objections in play
#[async_trait]
pub trait ObjectionPredictor: Send + Sync {
    async fn predict_objections(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<Vec<DetectedObjection>, PredictionError>;
}

/// Predicts the customer's needs
#[async_trait]
pub trait NeedPredictor: Send + Sync {
    async fn predict_needs(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<Vec<DetectedNeed>, PredictionError>;
}
