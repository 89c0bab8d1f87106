//! Weighted strategy selection
//!
//! The selector keeps one weight per strategy (starting at 1.0) for its whole
//! lifetime. Selection ranks strategies by `score × weight`; ties go to the
//! earlier strategy in catalog order. Weights change only via
//! [`StrategySelector::adapt_weights`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use sales_agent_config::constants::strategy;
use sales_agent_core::ConversationContext;

use super::{scoring, StrategyDecision, StrategyKind};

/// One entry of a multi-strategy comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStrategy {
    pub strategy: StrategyKind,
    pub score: f32,
    pub weight: f32,
    pub weighted_score: f32,
    pub decision: StrategyDecision,
}

#[derive(Debug)]
pub struct StrategySelector {
    weights: RwLock<HashMap<StrategyKind, f32>>,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategySelector {
    pub fn new() -> Self {
        Self {
            weights: RwLock::new(StrategyKind::ALL.into_iter().map(|k| (k, 1.0)).collect()),
        }
    }

    pub fn weight(&self, kind: StrategyKind) -> f32 {
        self.weights.read().get(&kind).copied().unwrap_or(1.0)
    }

    /// Snapshot of every weight, ordered by catalog position
    pub fn weights(&self) -> BTreeMap<StrategyKind, f32> {
        let weights = self.weights.read();
        StrategyKind::ALL
            .into_iter()
            .map(|k| (k, weights.get(&k).copied().unwrap_or(1.0)))
            .collect()
    }

    /// Every strategy, best weighted score first
    fn ranked(&self, ctx: &ConversationContext) -> Vec<(StrategyKind, f32, f32)> {
        let weights = self.weights.read();
        let mut ranked: Vec<(StrategyKind, f32, f32)> = StrategyKind::ALL
            .into_iter()
            .map(|kind| {
                let weight = weights.get(&kind).copied().unwrap_or(1.0);
                (kind, kind.score(ctx), weight)
            })
            .collect();
        drop(weights);

        // Stable sort keeps catalog order among equal weighted scores
        ranked.sort_by(|a, b| (b.1 * b.2).total_cmp(&(a.1 * a.2)));
        ranked
    }

    /// Arg-max strategy by weighted score, executed
    pub fn select_optimal(&self, ctx: &ConversationContext) -> StrategyDecision {
        let (kind, score, weight) = self
            .ranked(ctx)
            .into_iter()
            .next()
            .unwrap_or((StrategyKind::Adaptive, 0.0, 1.0));
        tracing::debug!(
            strategy = %kind,
            score,
            weight,
            signals = ?scoring::table(kind).explain(ctx),
            "Selected strategy"
        );
        kind.execute(ctx)
    }

    /// Top `top_n` strategies by weighted score, each executed
    pub fn multi_recommendation(&self, ctx: &ConversationContext, top_n: usize) -> Vec<RankedStrategy> {
        self.ranked(ctx)
            .into_iter()
            .take(top_n)
            .map(|(kind, score, weight)| RankedStrategy {
                strategy: kind,
                score,
                weight,
                weighted_score: score * weight,
                decision: kind.execute(ctx),
            })
            .collect()
    }

    /// Reward strategies that performed well, penalise those that did not
    ///
    /// Performance above 0.7 multiplies the weight by 1.1, below 0.3 by 0.9;
    /// every weight stays within [0.5, 2.0].
    pub fn adapt_weights(&self, performance: &HashMap<StrategyKind, f32>) {
        let mut weights = self.weights.write();
        for (kind, observed) in performance {
            let factor = if *observed > strategy::HIGH_PERFORMANCE {
                strategy::REWARD_FACTOR
            } else if *observed < strategy::LOW_PERFORMANCE {
                strategy::PENALTY_FACTOR
            } else {
                1.0
            };
            let weight = weights.entry(*kind).or_insert(1.0);
            let adapted = (*weight * factor).clamp(strategy::MIN_WEIGHT, strategy::MAX_WEIGHT);
            if (adapted - *weight).abs() > f32::EPSILON {
                tracing::info!(strategy = %kind, from = *weight, to = adapted, "Strategy weight adapted");
            }
            *weight = adapted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sales_agent_core::DecisionTimeline;

    fn perf(kind: StrategyKind, value: f32) -> HashMap<StrategyKind, f32> {
        HashMap::from([(kind, value)])
    }

    #[test]
    fn test_weights_start_at_one() {
        let selector = StrategySelector::new();
        assert!(selector.weights().values().all(|w| *w == 1.0));
        assert_eq!(selector.weights().len(), 7);
    }

    #[test]
    fn test_reward_and_penalty() {
        let selector = StrategySelector::new();

        selector.adapt_weights(&perf(StrategyKind::Aggressive, 0.85));
        assert!((selector.weight(StrategyKind::Aggressive) - 1.1).abs() < 1e-6);

        selector.adapt_weights(&perf(StrategyKind::Conservative, 0.2));
        assert!((selector.weight(StrategyKind::Conservative) - 0.9).abs() < 1e-6);

        selector.adapt_weights(&perf(StrategyKind::Adaptive, 0.5));
        assert_eq!(selector.weight(StrategyKind::Adaptive), 1.0);
    }

    #[test]
    fn test_weights_are_clamped() {
        let selector = StrategySelector::new();
        for _ in 0..50 {
            let old = selector.weight(StrategyKind::Aggressive);
            selector.adapt_weights(&perf(StrategyKind::Aggressive, 0.95));
            let expected = (old * 1.1).min(2.0);
            assert!((selector.weight(StrategyKind::Aggressive) - expected).abs() < 1e-5);
        }
        assert_eq!(selector.weight(StrategyKind::Aggressive), 2.0);

        for _ in 0..50 {
            let old = selector.weight(StrategyKind::Conservative);
            selector.adapt_weights(&perf(StrategyKind::Conservative, 0.0));
            let expected = (old * 0.9).max(0.5);
            assert!((selector.weight(StrategyKind::Conservative) - expected).abs() < 1e-5);
        }
        assert_eq!(selector.weight(StrategyKind::Conservative), 0.5);
    }

    #[test]
    fn test_ties_follow_catalog_order() {
        let selector = StrategySelector::new();
        // Two strategies scoring equally keep catalog order
        let ranked = selector.multi_recommendation(&ConversationContext::default(), 7);
        for pair in ranked.windows(2) {
            assert!(pair[0].weighted_score >= pair[1].weighted_score);
            if pair[0].weighted_score == pair[1].weighted_score {
                assert!(pair[0].strategy < pair[1].strategy);
            }
        }
    }

    #[test]
    fn test_hot_lead_selects_aggressive() {
        let selector = StrategySelector::new();
        let ctx = ConversationContext {
            message_count: 14,
            engagement_score: 0.9,
            customer_sentiment: 0.6,
            decision_timeline: DecisionTimeline::Immediate,
            conversion_probability: 0.85,
            ..ConversationContext::default()
        };
        let decision = selector.select_optimal(&ctx);
        assert_eq!(decision.strategy, StrategyKind::Aggressive);
        assert_eq!(decision.recommended_action, "attempt_close");
    }

    #[test]
    fn test_weight_shifts_selection() {
        let selector = StrategySelector::new();
        let ctx = ConversationContext {
            customer_sentiment: -0.6,
            ..ConversationContext::default()
        };
        // Empathetic 0.6 beats conservative 0.5 at equal weights
        assert_eq!(selector.select_optimal(&ctx).strategy, StrategyKind::Empathetic);

        for _ in 0..10 {
            selector.adapt_weights(&HashMap::from([
                (StrategyKind::Conservative, 0.9),
                (StrategyKind::Empathetic, 0.1),
            ]));
        }
        assert_eq!(selector.select_optimal(&ctx).strategy, StrategyKind::Conservative);
    }

    #[test]
    fn test_multi_recommendation_top_n() {
        let selector = StrategySelector::new();
        let ranked = selector.multi_recommendation(&ConversationContext::default(), 3);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|r| r.decision.strategy == r.strategy));
    }
}
