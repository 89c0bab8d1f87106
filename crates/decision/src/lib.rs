//! Decision orchestration for the sales agent
//!
//! Features:
//! - Bounded TTL decision cache keyed by a deterministic request fingerprint
//! - Prediction orchestrator: conversion, objection and need predictions, each
//!   behind its own breaker, gathered in parallel or sequentially under a budget
//! - Seven-strategy catalog with table-driven scoring and adaptive weights
//! - Multi-factor action scoring for accurate mode
//! - `DecisionEngine`, the composition root, with timeout and error fallbacks
//!
//! # Example
//!
//! ```ignore
//! use sales_agent_decision::{DecisionEngine, Predictors};
//! use sales_agent_config::DecisionConfig;
//!
//! let engine = DecisionEngine::builder(DecisionConfig::default())
//!     .predictors(Predictors::new().with_conversion(conversion))
//!     .build()?;
//! let record = engine.make_decision(&messages, &profile, None).await;
//! ```

pub mod action_scoring;
pub mod actions;
pub mod cache;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod strategy;
pub mod telemetry;

pub use action_scoring::{rank_actions, ActionScore};
pub use actions::SalesAction;
pub use cache::{fingerprint, CacheStats, DecisionCache};
pub use engine::{
    AlternativeAction, DecisionEngine, DecisionEngineBuilder, DecisionRecord, EngineMetrics,
    FallbackKind, FeatureFlags,
};
pub use error::{DecisionError, Result};
pub use orchestrator::{PredictionBundle, PredictionOrchestrator, Predictors};
pub use strategy::{
    RankedStrategy, Signal, SignalTable, StrategyDecision, StrategyKind, StrategySelector,
    UnknownStrategy,
};
pub use telemetry::MetricsFacadeSink;
