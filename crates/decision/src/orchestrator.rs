//! Prediction orchestration
//!
//! Issues the conversion, objection and need predictions for one decision.
//! Each predictor sits behind its own named breaker; a failed or rejected
//! prediction degrades to that field's default instead of aborting the gather.
//! The whole bundle runs under one time budget, and outstanding predictions are
//! dropped (and their breaker slots released) when the budget is exceeded.

use futures::future::{self, Future};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use sales_agent_config::constants::{breakers, decision};
use sales_agent_config::{BreakersConfig, ConfigError, DecisionConfig, OptimizationMode};
use sales_agent_core::{
    ConversionPredictor, CustomerProfile, DetectedNeed, DetectedObjection, Message, MetricsEvent,
    MetricsSink, NeedPredictor, ObjectionPredictor, PredictionError, PredictionKind,
};
use sales_agent_resilience::{BreakerError, BreakerRegistry, Protected};

use crate::error::DecisionError;

/// Optional predictor collaborators
#[derive(Clone, Default)]
pub struct Predictors {
    pub conversion: Option<Arc<dyn ConversionPredictor>>,
    pub objections: Option<Arc<dyn ObjectionPredictor>>,
    pub needs: Option<Arc<dyn NeedPredictor>>,
}

impl Predictors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversion(mut self, predictor: Arc<dyn ConversionPredictor>) -> Self {
        self.conversion = Some(predictor);
        self
    }

    pub fn with_objections(mut self, predictor: Arc<dyn ObjectionPredictor>) -> Self {
        self.objections = Some(predictor);
        self
    }

    pub fn with_needs(mut self, predictor: Arc<dyn NeedPredictor>) -> Self {
        self.needs = Some(predictor);
        self
    }
}

impl std::fmt::Debug for Predictors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictors")
            .field("conversion", &self.conversion.is_some())
            .field("objections", &self.objections.is_some())
            .field("needs", &self.needs.is_some())
            .finish()
    }
}

/// Raw predictions behind a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    pub conversion_probability: f32,
    pub objections: Vec<DetectedObjection>,
    pub needs: Vec<DetectedNeed>,
    /// Fields holding their default: not requested, predictor absent, failed or rejected
    pub defaulted: Vec<PredictionKind>,
    pub elapsed_ms: f64,
}

impl PredictionBundle {
    pub fn is_defaulted(&self, kind: PredictionKind) -> bool {
        self.defaulted.contains(&kind)
    }

    pub fn need_tags(&self) -> Vec<String> {
        self.needs.iter().map(|n| n.tag.clone()).collect()
    }

    pub fn has_objection(&self, kind: &str) -> bool {
        self.objections
            .iter()
            .any(|o| o.kind.eq_ignore_ascii_case(kind))
    }
}

enum FieldOutcome<T> {
    Absent,
    Value(T),
    Failed,
}

impl<T> FieldOutcome<T> {
    fn failed(&self) -> bool {
        matches!(self, FieldOutcome::Failed)
    }

    fn resolve(self, kind: PredictionKind, defaulted: &mut Vec<PredictionKind>, default: T) -> T {
        match self {
            FieldOutcome::Value(value) => value,
            FieldOutcome::Absent | FieldOutcome::Failed => {
                defaulted.push(kind);
                default
            },
        }
    }
}

pub struct PredictionOrchestrator {
    conversion: Option<Protected<dyn ConversionPredictor>>,
    objections: Option<Protected<dyn ObjectionPredictor>>,
    needs: Option<Protected<dyn NeedPredictor>>,
    config: DecisionConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl PredictionOrchestrator {
    /// Wrap each configured predictor in its registry breaker
    pub fn new(
        predictors: Predictors,
        registry: &BreakerRegistry,
        breaker_config: &BreakersConfig,
        config: DecisionConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        let guard = |name: &str| {
            registry.get_or_create(name, Some(breaker_config.for_predictor(name)))
        };

        let conversion = match predictors.conversion {
            Some(p) => Some(Protected::new(guard(breakers::CONVERSION)?, p)),
            None => None,
        };
        let objections = match predictors.objections {
            Some(p) => Some(Protected::new(guard(breakers::OBJECTIONS)?, p)),
            None => None,
        };
        let needs = match predictors.needs {
            Some(p) => Some(Protected::new(guard(breakers::NEEDS)?, p)),
            None => None,
        };

        Ok(Self {
            conversion,
            objections,
            needs,
            config,
            metrics,
        })
    }

    /// Number of predictors present
    pub fn configured(&self) -> usize {
        [
            self.conversion.is_some(),
            self.objections.is_some(),
            self.needs.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Time budget for one gather in `mode`
    pub fn budget(&self, mode: OptimizationMode) -> Duration {
        let base = self.config.timeout();
        match mode {
            OptimizationMode::Fast => base / 2,
            OptimizationMode::Accurate => base * 2,
            OptimizationMode::Standard | OptimizationMode::Cached => base,
        }
    }

    /// Gather the predictions for one decision
    ///
    /// Fast mode requests the conversion probability only and degrades to the
    /// default on timeout. The other modes request all three and surface
    /// [`DecisionError::Timeout`] when the bundle exceeds its budget, or
    /// [`DecisionError::PredictionsUnavailable`] when every present predictor
    /// failed.
    pub async fn gather(
        &self,
        messages: &[Message],
        profile: &CustomerProfile,
        mode: OptimizationMode,
    ) -> Result<PredictionBundle, DecisionError> {
        let started = Instant::now();
        let budget = self.budget(mode);
        let conversation_id = profile.conversation_id();

        if mode == OptimizationMode::Fast {
            let outcome = match tokio::time::timeout(
                budget,
                self.conversion(conversation_id, messages, profile),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        budget_ms = budget.as_millis() as u64,
                        "Fast-mode conversion prediction timed out, using default"
                    );
                    FieldOutcome::Failed
                },
            };

            let mut defaulted = Vec::new();
            let conversion_probability = outcome.resolve(
                PredictionKind::Conversion,
                &mut defaulted,
                decision::DEFAULT_CONVERSION_PROBABILITY,
            );
            defaulted.extend([PredictionKind::Objections, PredictionKind::Needs]);
            return Ok(PredictionBundle {
                conversion_probability,
                objections: Vec::new(),
                needs: Vec::new(),
                defaulted,
                elapsed_ms: elapsed_ms(started),
            });
        }

        let gather = self.gather_all(conversation_id, messages, profile, mode);
        let (conversion, objections, needs) = tokio::time::timeout(budget, gather)
            .await
            .map_err(|_| DecisionError::Timeout {
                budget_ms: budget.as_millis() as u64,
            })?;

        let configured = self.configured();
        let failed = [conversion.failed(), objections.failed(), needs.failed()]
            .iter()
            .filter(|f| **f)
            .count();
        if configured > 0 && failed == configured {
            tracing::warn!(configured, "Every configured predictor failed");
            return Err(DecisionError::PredictionsUnavailable);
        }

        let mut defaulted = Vec::new();
        let conversion_probability = conversion.resolve(
            PredictionKind::Conversion,
            &mut defaulted,
            decision::DEFAULT_CONVERSION_PROBABILITY,
        );
        let objections = objections.resolve(PredictionKind::Objections, &mut defaulted, Vec::new());
        let needs = needs.resolve(PredictionKind::Needs, &mut defaulted, Vec::new());

        Ok(PredictionBundle {
            conversion_probability,
            objections,
            needs,
            defaulted,
            elapsed_ms: elapsed_ms(started),
        })
    }

    async fn gather_all(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
        mode: OptimizationMode,
    ) -> (
        FieldOutcome<f32>,
        FieldOutcome<Vec<DetectedObjection>>,
        FieldOutcome<Vec<DetectedNeed>>,
    ) {
        // Accurate mode always fans out
        if self.config.parallel_processing || mode == OptimizationMode::Accurate {
            future::join3(
                self.conversion(conversation_id, messages, profile),
                self.objections(conversation_id, messages, profile),
                self.needs(conversation_id, messages, profile),
            )
            .await
        } else {
            let conversion = self.conversion(conversation_id, messages, profile).await;
            let objections = self.objections(conversation_id, messages, profile).await;
            let needs = self.needs(conversation_id, messages, profile).await;
            (conversion, objections, needs)
        }
    }

    async fn conversion(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> FieldOutcome<f32> {
        let Some(predictor) = &self.conversion else {
            return FieldOutcome::Absent;
        };
        self.attempt(PredictionKind::Conversion, move || {
            predictor.call(move |p| p.predict_conversion(conversation_id, messages, profile))
        })
        .await
        .map(|estimate| estimate.probability.clamp(0.0, 1.0))
    }

    async fn objections(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> FieldOutcome<Vec<DetectedObjection>> {
        let Some(predictor) = &self.objections else {
            return FieldOutcome::Absent;
        };
        self.attempt(PredictionKind::Objections, move || {
            predictor.call(move |p| p.predict_objections(conversation_id, messages, profile))
        })
        .await
    }

    async fn needs(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> FieldOutcome<Vec<DetectedNeed>> {
        let Some(predictor) = &self.needs else {
            return FieldOutcome::Absent;
        };
        self.attempt(PredictionKind::Needs, move || {
            predictor.call(move |p| p.predict_needs(conversation_id, messages, profile))
        })
        .await
    }

    /// Run one protected prediction with up to `max_retries` extra attempts
    ///
    /// A breaker rejection ends the attempt immediately.
    async fn attempt<R, F, Fut>(&self, kind: PredictionKind, mut call: F) -> FieldOutcome<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, BreakerError<PredictionError>>>,
    {
        let started = Instant::now();
        let mut retries = 0;

        let outcome = loop {
            match call().await {
                Ok(value) => break FieldOutcome::Value(value),
                Err(BreakerError::Open(rejected)) => {
                    tracing::warn!(kind = %kind, breaker = %rejected.name, "Prediction rejected by open breaker");
                    break FieldOutcome::Failed;
                },
                Err(BreakerError::Inner(err)) if retries < self.config.max_retries => {
                    retries += 1;
                    tracing::debug!(kind = %kind, error = %err, retry = retries, "Retrying prediction");
                },
                Err(BreakerError::Inner(err)) => {
                    tracing::warn!(kind = %kind, error = %err, "Prediction failed, using default");
                    break FieldOutcome::Failed;
                },
            }
        };

        self.metrics.record(MetricsEvent::new(
            format!("prediction.{}", kind),
            elapsed_ms(started),
            matches!(outcome, FieldOutcome::Value(_)),
        ));
        outcome
    }
}

impl<T> FieldOutcome<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> FieldOutcome<U> {
        match self {
            FieldOutcome::Absent => FieldOutcome::Absent,
            FieldOutcome::Value(value) => FieldOutcome::Value(f(value)),
            FieldOutcome::Failed => FieldOutcome::Failed,
        }
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sales_agent_core::{ConversionEstimate, NoopMetricsSink};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedConversion {
        probability: f32,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedConversion {
        fn new(probability: f32) -> Self {
            Self {
                probability,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(probability: f32, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(probability)
            }
        }
    }

    #[async_trait]
    impl ConversionPredictor for FixedConversion {
        async fn predict_conversion(
            &self,
            _conversation_id: &str,
            _messages: &[Message],
            _profile: &CustomerProfile,
        ) -> Result<ConversionEstimate, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(ConversionEstimate::new(self.probability))
        }
    }

    /// Fails the first `failures` calls
    struct FlakyObjections {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObjectionPredictor for FlakyObjections {
        async fn predict_objections(
            &self,
            _conversation_id: &str,
            _messages: &[Message],
            _profile: &CustomerProfile,
        ) -> Result<Vec<DetectedObjection>, PredictionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(PredictionError::Backend("flaky".to_string()))
            } else {
                Ok(vec![DetectedObjection::new("price", 0.9)])
            }
        }
    }

    struct FailingNeeds;

    #[async_trait]
    impl NeedPredictor for FailingNeeds {
        async fn predict_needs(
            &self,
            _conversation_id: &str,
            _messages: &[Message],
            _profile: &CustomerProfile,
        ) -> Result<Vec<DetectedNeed>, PredictionError> {
            Err(PredictionError::Unavailable("down".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<MetricsEvent>>,
    }

    impl MetricsSink for RecordingSink {
        fn record(&self, event: MetricsEvent) {
            self.events.lock().push(event);
        }
    }

    fn orchestrator(predictors: Predictors, config: DecisionConfig) -> PredictionOrchestrator {
        PredictionOrchestrator::new(
            predictors,
            &BreakerRegistry::new(),
            &BreakersConfig::default(),
            config,
            Arc::new(NoopMetricsSink),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_predictors_yields_defaults() {
        let orch = orchestrator(Predictors::new(), DecisionConfig::default());
        let bundle = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Standard)
            .await
            .unwrap();

        assert_eq!(bundle.conversion_probability, 0.5);
        assert!(bundle.objections.is_empty());
        assert!(bundle.needs.is_empty());
        assert_eq!(bundle.defaulted.len(), 3);
    }

    #[tokio::test]
    async fn test_single_failure_degrades_field() {
        let predictors = Predictors::new()
            .with_conversion(Arc::new(FixedConversion::new(0.8)))
            .with_needs(Arc::new(FailingNeeds));
        let orch = orchestrator(predictors, DecisionConfig::default());

        let bundle = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Standard)
            .await
            .unwrap();
        assert_eq!(bundle.conversion_probability, 0.8);
        assert!(bundle.needs.is_empty());
        assert!(bundle.is_defaulted(PredictionKind::Needs));
        assert!(bundle.is_defaulted(PredictionKind::Objections));
        assert!(!bundle.is_defaulted(PredictionKind::Conversion));
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failure() {
        let objections = Arc::new(FlakyObjections {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let orch = orchestrator(
            Predictors::new().with_objections(objections.clone()),
            DecisionConfig::default(),
        );

        let bundle = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Standard)
            .await
            .unwrap();
        assert!(bundle.has_objection("price"));
        assert_eq!(objections.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_configured_failed_is_unavailable() {
        let orch = orchestrator(
            Predictors::new().with_needs(Arc::new(FailingNeeds)),
            DecisionConfig::default(),
        );
        let result = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Accurate)
            .await;
        assert!(matches!(result, Err(DecisionError::PredictionsUnavailable)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bundle_timeout_is_distinguishable() {
        let mut config = DecisionConfig::default();
        config.timeout_seconds = 1.0;
        let orch = orchestrator(
            Predictors::new().with_conversion(Arc::new(FixedConversion::slow(
                0.9,
                Duration::from_secs(5),
            ))),
            config,
        );

        let result = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Standard)
            .await;
        match result {
            Err(DecisionError::Timeout { budget_ms }) => assert_eq!(budget_ms, 1000),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_mode_defaults_on_timeout() {
        let mut config = DecisionConfig::default();
        config.timeout_seconds = 2.0;
        let conversion = Arc::new(FixedConversion::slow(0.9, Duration::from_millis(1500)));
        let orch = orchestrator(Predictors::new().with_conversion(conversion.clone()), config);

        let bundle = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Fast)
            .await
            .unwrap();
        assert_eq!(bundle.conversion_probability, 0.5);
        assert!(bundle.is_defaulted(PredictionKind::Conversion));
        assert_eq!(conversion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fast_mode_skips_other_predictors() {
        let objections = Arc::new(FlakyObjections {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let orch = orchestrator(
            Predictors::new()
                .with_conversion(Arc::new(FixedConversion::new(0.75)))
                .with_objections(objections.clone()),
            DecisionConfig::default(),
        );

        let bundle = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Fast)
            .await
            .unwrap();
        assert_eq!(bundle.conversion_probability, 0.75);
        assert_eq!(
            bundle.defaulted,
            vec![PredictionKind::Objections, PredictionKind::Needs]
        );
        assert_eq!(objections.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accurate_mode_doubles_budget() {
        let mut config = DecisionConfig::default();
        config.timeout_seconds = 1.0;
        let orch = orchestrator(
            Predictors::new().with_conversion(Arc::new(FixedConversion::slow(
                0.9,
                Duration::from_millis(1500),
            ))),
            config,
        );

        let bundle = orch
            .gather(&[], &CustomerProfile::new(), OptimizationMode::Accurate)
            .await
            .unwrap();
        assert_eq!(bundle.conversion_probability, 0.9);
    }

    #[tokio::test]
    async fn test_metrics_recorded_per_prediction() {
        let sink = Arc::new(RecordingSink::default());
        let orch = PredictionOrchestrator::new(
            Predictors::new()
                .with_conversion(Arc::new(FixedConversion::new(0.6)))
                .with_needs(Arc::new(FailingNeeds)),
            &BreakerRegistry::new(),
            &BreakersConfig::default(),
            DecisionConfig::default(),
            sink.clone(),
        )
        .unwrap();

        orch.gather(&[], &CustomerProfile::new(), OptimizationMode::Standard)
            .await
            .unwrap();

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| e.kind == "prediction.conversion" && e.success));
        assert!(events.iter().any(|e| e.kind == "prediction.needs" && !e.success));
    }
}
