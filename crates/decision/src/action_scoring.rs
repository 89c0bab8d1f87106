//! Multi-factor action scoring
//!
//! Accurate mode ranks a fixed set of candidate actions instead of applying
//! the standard thresholds. Every candidate has a weight per factor; factors
//! are normalised to [0, 1] and the score is `Σ weight × factor` divided by the
//! sum of the positive weights, clamped to [0, 1].

use serde::{Deserialize, Serialize};

use sales_agent_core::{ConversationContext, DecisionTimeline};

use crate::actions::SalesAction;
use crate::strategy::StrategyDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Factor {
    Conversion,
    /// 1 - conversion
    ConversionGap,
    /// Peaks when conversion sits mid-range
    ConversionMidrange,
    /// objections / 3, capped at 1
    ObjectionPressure,
    /// needs / 3, capped at 1
    NeedCoverage,
    NeedGap,
    /// Sentiment mapped from [-1, 1] to [0, 1]
    Sentiment,
    Negativity,
    Engagement,
    Disengagement,
    TimelineUrgency,
    EarlyStage,
    PriceOrCompetitor,
    /// The selected strategy recommends this action's family
    StrategyAgreement,
}

struct Factors<'a> {
    ctx: &'a ConversationContext,
    strategy_family: Option<SalesAction>,
}

impl Factors<'_> {
    fn value(&self, factor: Factor, candidate: SalesAction) -> f32 {
        let ctx = self.ctx;
        let need_coverage = (ctx.detected_needs.len() as f32 / 3.0).min(1.0);
        match factor {
            Factor::Conversion => ctx.conversion_probability,
            Factor::ConversionGap => 1.0 - ctx.conversion_probability,
            Factor::ConversionMidrange => {
                (1.0 - (ctx.conversion_probability - 0.55).abs() * 2.0).max(0.0)
            },
            Factor::ObjectionPressure => (ctx.objection_count as f32 / 3.0).min(1.0),
            Factor::NeedCoverage => need_coverage,
            Factor::NeedGap => 1.0 - need_coverage,
            Factor::Sentiment => (ctx.customer_sentiment + 1.0) / 2.0,
            Factor::Negativity => (-ctx.customer_sentiment).max(0.0),
            Factor::Engagement => ctx.engagement_score,
            Factor::Disengagement => 1.0 - ctx.engagement_score,
            Factor::TimelineUrgency => match ctx.decision_timeline {
                DecisionTimeline::Immediate => 1.0,
                DecisionTimeline::ShortTerm => 0.6,
                DecisionTimeline::LongTerm => 0.2,
                DecisionTimeline::Unknown => 0.4,
            },
            Factor::EarlyStage => {
                if ctx.message_count <= 3 {
                    1.0
                } else {
                    0.0
                }
            },
            Factor::PriceOrCompetitor => {
                if ctx.price_mentioned || ctx.competitor_mentioned {
                    1.0
                } else {
                    0.0
                }
            },
            Factor::StrategyAgreement => {
                if self.strategy_family == Some(candidate) {
                    1.0
                } else {
                    0.0
                }
            },
        }
    }
}

fn weights(candidate: SalesAction) -> &'static [(Factor, f32)] {
    match candidate {
        SalesAction::AttemptClose => &[
            (Factor::Conversion, 0.4),
            (Factor::TimelineUrgency, 0.2),
            (Factor::Engagement, 0.15),
            (Factor::Sentiment, 0.1),
            (Factor::StrategyAgreement, 0.15),
            (Factor::ObjectionPressure, -0.4),
        ],
        SalesAction::HandleObjection => &[
            (Factor::ObjectionPressure, 0.6),
            (Factor::Negativity, 0.15),
            (Factor::StrategyAgreement, 0.15),
            (Factor::Conversion, 0.1),
        ],
        SalesAction::PresentValue => &[
            (Factor::NeedCoverage, 0.35),
            (Factor::Conversion, 0.25),
            (Factor::Engagement, 0.15),
            (Factor::PriceOrCompetitor, 0.1),
            (Factor::StrategyAgreement, 0.15),
        ],
        SalesAction::NurtureInterest => &[
            (Factor::ConversionMidrange, 0.35),
            (Factor::Engagement, 0.2),
            (Factor::Sentiment, 0.15),
            (Factor::StrategyAgreement, 0.15),
            (Factor::ObjectionPressure, -0.15),
        ],
        SalesAction::QualifyNeeds => &[
            (Factor::NeedGap, 0.4),
            (Factor::ConversionGap, 0.25),
            (Factor::EarlyStage, 0.2),
            (Factor::StrategyAgreement, 0.15),
        ],
        SalesAction::BuildRapport => &[
            (Factor::Negativity, 0.35),
            (Factor::Disengagement, 0.25),
            (Factor::EarlyStage, 0.2),
            (Factor::StrategyAgreement, 0.15),
            (Factor::Conversion, -0.1),
        ],
        _ => &[],
    }
}

/// Score of one candidate action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionScore {
    pub action: SalesAction,
    pub score: f32,
}

/// Rank every candidate action, best first
///
/// Equal scores keep candidate order.
pub fn rank_actions(
    ctx: &ConversationContext,
    strategy: Option<&StrategyDecision>,
) -> Vec<ActionScore> {
    let factors = Factors {
        ctx,
        strategy_family: strategy
            .and_then(|s| SalesAction::parse(&s.recommended_action))
            .map(|a| a.family()),
    };

    let mut scores: Vec<ActionScore> = SalesAction::CANDIDATES
        .into_iter()
        .map(|candidate| {
            let table = weights(candidate);
            let positive: f32 = table.iter().filter(|(_, w)| *w > 0.0).map(|(_, w)| w).sum();
            let raw: f32 = table
                .iter()
                .map(|(factor, w)| w * factors.value(*factor, candidate))
                .sum();
            let score = if positive > 0.0 {
                (raw / positive).clamp(0.0, 1.0)
            } else {
                0.0
            };
            ActionScore {
                action: candidate,
                score,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}
