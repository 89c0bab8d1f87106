//! Decision engine
//!
//! Composition root of the decision layer. One call to
//! [`DecisionEngine::make_decision`]:
//!
//! 1. looks the request fingerprint up in the cache (when caching is active)
//! 2. gathers predictions for the configured optimisation mode
//! 3. builds the conversation context and chooses an action
//! 4. stores the decision in the cache
//!
//! Steps 2 and 3 run under the top-level `decision_engine` breaker. Runtime
//! failures never escape: a gather timeout yields the timeout fallback, every
//! other failure (including an open breaker) the error fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use sales_agent_config::constants::{breakers, decision, fallback};
use sales_agent_config::{
    BreakersConfig, CacheConfig, ConfigError, DecisionConfig, OptimizationMode,
};
use sales_agent_core::{
    ConversationContext, CustomerProfile, Message, MetricsEvent, MetricsSink, NoopMetricsSink,
    PredictionKind,
};
use sales_agent_resilience::{BreakerError, BreakerRegistry, CircuitBreaker, CircuitState};

use crate::action_scoring::{rank_actions, ActionScore};
use crate::actions::SalesAction;
use crate::cache::{fingerprint, CacheStats, DecisionCache};
use crate::error::DecisionError;
use crate::orchestrator::{elapsed_ms, PredictionBundle, PredictionOrchestrator, Predictors};
use crate::strategy::{RankedStrategy, StrategyDecision, StrategyKind, StrategySelector};

const ENGINE_ID: &str = concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION"));

/// Strategies compared in accurate mode
const ACCURATE_TOP_STRATEGIES: usize = 3;
/// Strategies consulted for standard-mode alternatives
const STANDARD_ALTERNATIVES: usize = 3;

/// Why a decision is a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    Timeout,
    Error,
}

/// An action considered but not chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeAction {
    pub action: String,
    pub confidence: f32,
    /// Strategy name, or `action_scoring`
    pub source: String,
}

/// Output of one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: Uuid,
    pub action: String,
    pub confidence: f32,
    pub urgency_level: u8,
    pub reasoning: String,
    /// Raw predictions; absent on fallbacks
    pub predictions: Option<PredictionBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyDecision>,
    /// Multi-strategy comparison (accurate mode)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<RankedStrategy>,
    #[serde(default)]
    pub alternatives: Vec<AlternativeAction>,
    pub optimization_mode: OptimizationMode,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_kind: Option<FallbackKind>,
    pub cached: bool,
    /// Running cache statistics (standard mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_stats: Option<CacheStats>,
    pub decided_at: DateTime<Utc>,
    pub latency_ms: f64,
}

impl DecisionRecord {
    fn new(mode: OptimizationMode, action: SalesAction, confidence: f32, reasoning: String) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            action: action.as_str().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            urgency_level: action.default_urgency(),
            reasoning,
            predictions: None,
            strategy: None,
            strategies: Vec::new(),
            alternatives: Vec::new(),
            optimization_mode: mode,
            fallback: false,
            fallback_kind: None,
            cached: false,
            cache_stats: None,
            decided_at: Utc::now(),
            latency_ms: 0.0,
        }
    }

    fn fallback(mode: OptimizationMode, kind: FallbackKind, reason: String) -> Self {
        let (action, confidence, urgency) = match kind {
            FallbackKind::Timeout => (
                fallback::TIMEOUT_ACTION,
                fallback::TIMEOUT_CONFIDENCE,
                fallback::TIMEOUT_URGENCY,
            ),
            FallbackKind::Error => (
                fallback::ERROR_ACTION,
                fallback::ERROR_CONFIDENCE,
                fallback::ERROR_URGENCY,
            ),
        };
        Self {
            action: action.to_string(),
            confidence,
            urgency_level: urgency,
            fallback: true,
            fallback_kind: Some(kind),
            ..Self::new(mode, SalesAction::ContinueConversation, confidence, reason)
        }
    }
}

/// Feature toggles in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub cache: bool,
    pub circuit_breaker: bool,
    pub advanced_strategies: bool,
    pub parallel_processing: bool,
}

/// Engine counters snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub total_calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub optimization_mode: OptimizationMode,
    pub feature_flags: FeatureFlags,
    pub configured_predictors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker_state: Option<CircuitState>,
}

pub struct DecisionEngineBuilder {
    config: DecisionConfig,
    breakers: BreakersConfig,
    cache: CacheConfig,
    predictors: Predictors,
    registry: Option<Arc<BreakerRegistry>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    engine_id: Option<String>,
}

impl DecisionEngineBuilder {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            breakers: BreakersConfig::default(),
            cache: CacheConfig::default(),
            predictors: Predictors::default(),
            registry: None,
            metrics: None,
            engine_id: None,
        }
    }

    pub fn breakers(mut self, breakers: BreakersConfig) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn predictors(mut self, predictors: Predictors) -> Self {
        self.predictors = predictors;
        self
    }

    /// Shared breaker registry; a private one is created otherwise
    pub fn registry(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Identity folded into cache fingerprints
    pub fn engine_id(mut self, id: impl Into<String>) -> Self {
        self.engine_id = Some(id.into());
        self
    }

    /// Validate the configuration and wire the engine
    pub fn build(self) -> Result<DecisionEngine, DecisionError> {
        self.config.validate()?;
        self.cache.validate()?;
        self.breakers.validate()?;

        let registry = self.registry.unwrap_or_default();
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopMetricsSink) as Arc<dyn MetricsSink>);

        let orchestrator = PredictionOrchestrator::new(
            self.predictors,
            &registry,
            &self.breakers,
            self.config.clone(),
            Arc::clone(&metrics),
        )?;

        let breaker = if self.config.enable_circuit_breaker {
            Some(registry.get_or_create(breakers::DECISION_ENGINE, Some(self.breakers.for_engine()))?)
        } else {
            None
        };

        let cache = if self.config.cache_active() {
            let capacity = NonZeroUsize::new(self.cache.max_entries).ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "cache.max_entries".to_string(),
                    message: "Must be at least 1".to_string(),
                }
            })?;
            Some(DecisionCache::new(capacity, self.config.cache_ttl()))
        } else {
            None
        };

        tracing::info!(
            mode = %self.config.optimization_mode,
            cache = cache.is_some(),
            circuit_breaker = breaker.is_some(),
            predictors = orchestrator.configured(),
            "Decision engine initialized"
        );

        Ok(DecisionEngine {
            id: self.engine_id.unwrap_or_else(|| ENGINE_ID.to_string()),
            config: self.config,
            cache_config: self.cache,
            orchestrator,
            selector: StrategySelector::new(),
            cache,
            breaker,
            registry,
            metrics,
            total_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        })
    }
}

pub struct DecisionEngine {
    id: String,
    config: DecisionConfig,
    cache_config: CacheConfig,
    orchestrator: PredictionOrchestrator,
    selector: StrategySelector,
    cache: Option<DecisionCache<DecisionRecord>>,
    breaker: Option<Arc<CircuitBreaker>>,
    registry: Arc<BreakerRegistry>,
    metrics: Arc<dyn MetricsSink>,
    total_calls: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl DecisionEngine {
    pub fn builder(config: DecisionConfig) -> DecisionEngineBuilder {
        DecisionEngineBuilder::new(config)
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    /// Decide the next conversational action
    ///
    /// Never fails; degraded answers carry `fallback: true`.
    pub async fn make_decision(
        &self,
        messages: &[Message],
        profile: &CustomerProfile,
        context: Option<&ConversationContext>,
    ) -> DecisionRecord {
        let started = Instant::now();
        let mode = self.config.optimization_mode;
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let key = self.cache.as_ref().map(|_| {
            fingerprint(
                &self.id,
                mode,
                messages,
                profile,
                context,
                self.cache_config.message_window,
                self.cache_config.message_truncate_chars,
            )
        });

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(mut record) = cache.get(key) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(mode = %mode, action = %record.action, "Decision cache hit");
                record.decision_id = Uuid::new_v4();
                record.cached = true;
                record.latency_ms = elapsed_ms(started);
                if mode == OptimizationMode::Standard {
                    record.cache_stats = Some(self.cache_stats());
                }
                return record;
            }
            tracing::debug!(mode = %mode, "Decision cache miss");
        }

        let outcome = match &self.breaker {
            Some(breaker) => {
                breaker
                    .protect(|| self.decide(messages, profile, context, mode))
                    .await
            },
            None => self
                .decide(messages, profile, context, mode)
                .await
                .map_err(BreakerError::Inner),
        };

        let mut record = match outcome {
            Ok(record) => {
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.set(key, record.clone());
                    self.cache_misses.fetch_add(1, Ordering::Relaxed);
                }
                record
            },
            Err(BreakerError::Inner(err)) if err.is_timeout() => {
                tracing::warn!(mode = %mode, error = %err, "Decision timed out, using timeout fallback");
                DecisionRecord::fallback(mode, FallbackKind::Timeout, err.to_string())
            },
            Err(BreakerError::Inner(err)) => {
                tracing::warn!(mode = %mode, error = %err, "Decision failed, using error fallback");
                DecisionRecord::fallback(mode, FallbackKind::Error, err.to_string())
            },
            Err(BreakerError::Open(open)) => {
                tracing::warn!(mode = %mode, breaker = %open.name, "Decision engine breaker open, using error fallback");
                DecisionRecord::fallback(mode, FallbackKind::Error, open.to_string())
            },
        };

        if mode == OptimizationMode::Standard {
            record.cache_stats = Some(self.cache_stats());
        }
        record.latency_ms = elapsed_ms(started);

        self.metrics.record(MetricsEvent::new(
            format!("decision.{}", mode),
            record.latency_ms,
            !record.fallback,
        ));
        tracing::info!(
            mode = %mode,
            action = %record.action,
            confidence = record.confidence,
            fallback = record.fallback,
            latency_ms = record.latency_ms,
            "Decision made"
        );

        record
    }

    async fn decide(
        &self,
        messages: &[Message],
        profile: &CustomerProfile,
        caller_context: Option<&ConversationContext>,
        mode: OptimizationMode,
    ) -> Result<DecisionRecord, DecisionError> {
        let bundle = self.orchestrator.gather(messages, profile, mode).await?;
        let ctx = merge_context(messages, profile, caller_context, &bundle);

        let mut record = match mode {
            OptimizationMode::Fast => fast_decision(&ctx),
            OptimizationMode::Accurate => self.accurate_decision(&ctx),
            OptimizationMode::Standard | OptimizationMode::Cached => self.standard_decision(&ctx, mode),
        };
        record.predictions = Some(bundle);
        Ok(record)
    }

    fn standard_decision(&self, ctx: &ConversationContext, mode: OptimizationMode) -> DecisionRecord {
        let conversion = ctx.conversion_probability;

        let (action, confidence, reasoning) = if conversion > 0.7 && ctx.objection_count == 0 {
            (
                SalesAction::AttemptClose,
                conversion,
                format!("High conversion likelihood ({:.2}) with no objections", conversion),
            )
        } else if ctx.objection_count > 0 {
            (
                SalesAction::HandleObjection,
                0.7,
                format!("{} objection(s) need handling before progressing", ctx.objection_count),
            )
        } else if conversion > 0.4 && !ctx.detected_needs.is_empty() {
            (
                SalesAction::PresentValue,
                0.65,
                format!("Moderate interest; address needs: {}", ctx.detected_needs.join(", ")),
            )
        } else if conversion > 0.4 {
            (
                SalesAction::NurtureInterest,
                0.6,
                format!("Moderate interest ({:.2}); keep building it", conversion),
            )
        } else {
            (
                SalesAction::QualifyNeeds,
                0.5,
                format!("Low conversion likelihood ({:.2}); qualify needs first", conversion),
            )
        };

        let mut record = DecisionRecord::new(mode, action, confidence, reasoning);

        if self.config.enable_advanced_strategies {
            let ranked = self.selector.multi_recommendation(ctx, STANDARD_ALTERNATIVES);
            record.alternatives = strategy_alternatives(&ranked, action.as_str());
            record.strategy = ranked.into_iter().next().map(|r| r.decision);
        }
        record
    }

    fn accurate_decision(&self, ctx: &ConversationContext) -> DecisionRecord {
        let strategies = self.selector.multi_recommendation(ctx, ACCURATE_TOP_STRATEGIES);
        let top = strategies.first().map(|r| r.decision.clone());
        let ranked = rank_actions(ctx, top.as_ref());

        let best = ranked.first().copied().unwrap_or(ActionScore {
            action: SalesAction::QualifyNeeds,
            score: 0.0,
        });
        let reasoning = match &top {
            Some(strategy) => format!(
                "Weighted action scoring chose {} ({:.2}); leading strategy {} recommends {}",
                best.action, best.score, strategy.strategy, strategy.recommended_action
            ),
            None => format!("Weighted action scoring chose {} ({:.2})", best.action, best.score),
        };

        let mut record =
            DecisionRecord::new(OptimizationMode::Accurate, best.action, best.score, reasoning);
        if let Some(strategy) = &top {
            if SalesAction::parse(&strategy.recommended_action).map(|a| a.family()) == Some(best.action) {
                record.urgency_level = strategy.urgency_level;
            }
        }
        record.alternatives = ranked
            .iter()
            .skip(1)
            .take(2)
            .map(|s| AlternativeAction {
                action: s.action.as_str().to_string(),
                confidence: s.score,
                source: "action_scoring".to_string(),
            })
            .collect();
        record.strategy = top;
        record.strategies = strategies;
        record
    }

    fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.cache_hits.load(Ordering::Relaxed),
            misses: self.cache_misses.load(Ordering::Relaxed),
            entries: self.cache.as_ref().map(|c| c.len()).unwrap_or(0),
        }
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        let stats = self.cache_stats();
        EngineMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            cache_hits: stats.hits,
            cache_misses: stats.misses,
            cache_hit_rate: stats.hit_rate(),
            cache_entries: stats.entries,
            optimization_mode: self.config.optimization_mode,
            feature_flags: FeatureFlags {
                cache: self.cache.is_some(),
                circuit_breaker: self.breaker.is_some(),
                advanced_strategies: self.config.enable_advanced_strategies,
                parallel_processing: self.config.parallel_processing,
            },
            configured_predictors: self.orchestrator.configured(),
            breaker_state: self.breaker.as_ref().map(|b| b.state()),
        }
    }

    /// Feed observed strategy performance back into the selector
    pub fn adapt_strategy_weights(
        &self,
        performance: &HashMap<StrategyKind, f32>,
    ) -> BTreeMap<StrategyKind, f32> {
        self.selector.adapt_weights(performance);
        self.selector.weights()
    }

    pub fn strategy_weights(&self) -> BTreeMap<StrategyKind, f32> {
        self.selector.weights()
    }

    /// Drop every cached decision
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

fn fast_decision(ctx: &ConversationContext) -> DecisionRecord {
    let conversion = ctx.conversion_probability;
    let action = if conversion > 0.7 {
        SalesAction::AttemptClose
    } else if conversion > 0.4 {
        SalesAction::NurtureInterest
    } else {
        SalesAction::QualifyNeeds
    };
    DecisionRecord::new(
        OptimizationMode::Fast,
        action,
        decision::FAST_MODE_CONFIDENCE,
        format!("Fast analysis: conversion likelihood {:.2}", conversion),
    )
}

/// Strategy actions other than `chosen`, one per action
fn strategy_alternatives(ranked: &[RankedStrategy], chosen: &str) -> Vec<AlternativeAction> {
    let mut seen = vec![chosen.to_string()];
    let mut alternatives = Vec::new();
    for entry in ranked {
        let action = &entry.decision.recommended_action;
        if seen.contains(action) {
            continue;
        }
        seen.push(action.clone());
        alternatives.push(AlternativeAction {
            action: action.clone(),
            confidence: entry.decision.confidence,
            source: entry.strategy.as_str().to_string(),
        });
    }
    alternatives
}

/// Context for one decision
///
/// A caller-supplied context is the base; otherwise it is derived from the
/// messages and profile. Predictions overwrite the base only for fields that
/// were actually predicted.
fn merge_context(
    messages: &[Message],
    profile: &CustomerProfile,
    caller_context: Option<&ConversationContext>,
    bundle: &PredictionBundle,
) -> ConversationContext {
    let mut ctx = caller_context
        .cloned()
        .unwrap_or_else(|| ConversationContext::from_conversation(messages, profile));

    if !bundle.is_defaulted(PredictionKind::Conversion) {
        ctx.conversion_probability = bundle.conversion_probability;
    }
    if !bundle.is_defaulted(PredictionKind::Objections) {
        ctx.objection_count = bundle.objections.len() as u32;
        ctx.price_mentioned |= bundle.has_objection("price");
        ctx.competitor_mentioned |= bundle.has_objection("competitor");
    }
    if !bundle.is_defaulted(PredictionKind::Needs) {
        ctx.detected_needs = bundle.need_tags();
    }
    ctx.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(defaulted: Vec<PredictionKind>) -> PredictionBundle {
        PredictionBundle {
            conversion_probability: 0.9,
            objections: vec![sales_agent_core::DetectedObjection::new("price", 0.8)],
            needs: vec![sales_agent_core::DetectedNeed::new("roi", 0.7)],
            defaulted,
            elapsed_ms: 1.0,
        }
    }

    #[test]
    fn test_caller_context_keeps_defaulted_fields() {
        let caller = ConversationContext {
            conversion_probability: 0.2,
            objection_count: 4,
            ..ConversationContext::default()
        };
        let merged = merge_context(
            &[],
            &CustomerProfile::new(),
            Some(&caller),
            &bundle(vec![PredictionKind::Conversion, PredictionKind::Objections]),
        );
        assert_eq!(merged.conversion_probability, 0.2);
        assert_eq!(merged.objection_count, 4);
        assert_eq!(merged.detected_needs, vec!["roi".to_string()]);
    }

    #[test]
    fn test_predictions_refine_context() {
        let merged = merge_context(&[], &CustomerProfile::new(), None, &bundle(Vec::new()));
        assert_eq!(merged.conversion_probability, 0.9);
        assert_eq!(merged.objection_count, 1);
        assert!(merged.price_mentioned);
        assert!(!merged.competitor_mentioned);
    }

    #[test]
    fn test_fast_bands() {
        let at = |p: f32| {
            fast_decision(&ConversationContext {
                conversion_probability: p,
                ..ConversationContext::default()
            })
        };
        assert_eq!(at(0.71).action, "attempt_close");
        assert_eq!(at(0.7).action, "nurture_interest");
        assert_eq!(at(0.41).action, "nurture_interest");
        assert_eq!(at(0.4).action, "qualify_needs");
        assert_eq!(at(0.9).confidence, 0.7);
    }

    #[test]
    fn test_fallback_records() {
        let timeout = DecisionRecord::fallback(
            OptimizationMode::Standard,
            FallbackKind::Timeout,
            "slow".to_string(),
        );
        assert_eq!(timeout.action, "continue_conversation");
        assert_eq!(timeout.confidence, 0.5);
        assert_eq!(timeout.urgency_level, 5);
        assert!(timeout.fallback);

        let error =
            DecisionRecord::fallback(OptimizationMode::Fast, FallbackKind::Error, "down".to_string());
        assert_eq!(error.action, "build_rapport");
        assert_eq!(error.confidence, 0.4);
        assert_eq!(error.urgency_level, 3);
        assert_eq!(error.fallback_kind, Some(FallbackKind::Error));
    }

    #[test]
    fn test_alternatives_skip_chosen_action() {
        let ctx = ConversationContext::default();
        let selector = StrategySelector::new();
        let ranked = selector.multi_recommendation(&ctx, 7);
        let chosen = ranked[0].decision.recommended_action.clone();

        let alternatives = strategy_alternatives(&ranked, &chosen);
        assert!(alternatives.iter().all(|a| a.action != chosen));
        let mut actions: Vec<_> = alternatives.iter().map(|a| a.action.clone()).collect();
        actions.sort();
        actions.dedup();
        assert_eq!(actions.len(), alternatives.len());
    }
}
