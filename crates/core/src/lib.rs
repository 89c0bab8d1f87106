//! Core traits and types for the sales agent decision layer
//!
//! This crate provides the foundational types shared by every other crate:
//! - Conversation messages and the open customer profile
//! - `ConversationContext`, the immutable per-decision snapshot strategies read
//! - Predictor traits (conversion, objections, needs) and their result types
//! - The fire-and-forget metrics sink interface
//! - Error types

pub mod context;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod prediction;

pub use context::{ConversationContext, ContextSignals};
pub use conversation::{CustomerProfile, DecisionTimeline, Message, Role};
pub use error::{CoreError, Result};
pub use metrics::{MetricsEvent, MetricsSink, NoopMetricsSink};
pub use prediction::{
    ConversionEstimate, ConversionPredictor, DetectedNeed, DetectedObjection, NeedPredictor,
    ObjectionPredictor, PredictionError, PredictionKind,
};
