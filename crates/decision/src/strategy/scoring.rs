//! Table-driven strategy scoring
//!
//! Each strategy owns a [`SignalTable`]: a base score plus one additive
//! contribution per context signal. The final score is
//! `clamp(base + Σ active contributions, 0, 1)`.

use sales_agent_core::{ConversationContext, DecisionTimeline};

use super::StrategyKind;

const ROI_NEED_TAGS: &[&str] = &["roi", "growth", "return", "savings", "value", "investment"];
const RELATIONSHIP_NEED_TAGS: &[&str] = &["support", "trust", "relationship", "service", "guidance"];

/// A boolean feature of the conversation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// engagement > 0.7
    HighEngagement,
    /// engagement < 0.3
    LowEngagement,
    /// sentiment > 0.3
    PositiveSentiment,
    /// sentiment < -0.3
    NegativeSentiment,
    /// more than 10 messages
    LateStage,
    /// at most 3 messages
    EarlyStage,
    ImmediateTimeline,
    ShortTermTimeline,
    LongTermTimeline,
    /// conversion > 0.7
    HighConversion,
    /// conversion in [0.3, 0.7]
    ModerateConversion,
    /// conversion < 0.3
    LowConversion,
    /// two or more objections
    MultipleObjections,
    AnyObjection,
    PriceMentioned,
    CompetitorMentioned,
    /// ROI or growth oriented need tags
    RoiNeeds,
    /// Support or trust oriented need tags
    RelationshipNeeds,
    /// immediate timeline and conversion > 0.7
    ImmediateHighConversion,
}

impl Signal {
    pub fn is_active(&self, ctx: &ConversationContext) -> bool {
        match self {
            Signal::HighEngagement => ctx.engagement_score > 0.7,
            Signal::LowEngagement => ctx.engagement_score < 0.3,
            Signal::PositiveSentiment => ctx.customer_sentiment > 0.3,
            Signal::NegativeSentiment => ctx.customer_sentiment < -0.3,
            Signal::LateStage => ctx.message_count > 10,
            Signal::EarlyStage => ctx.message_count <= 3,
            Signal::ImmediateTimeline => ctx.decision_timeline == DecisionTimeline::Immediate,
            Signal::ShortTermTimeline => ctx.decision_timeline == DecisionTimeline::ShortTerm,
            Signal::LongTermTimeline => ctx.decision_timeline == DecisionTimeline::LongTerm,
            Signal::HighConversion => ctx.conversion_probability > 0.7,
            Signal::ModerateConversion => (0.3..=0.7).contains(&ctx.conversion_probability),
            Signal::LowConversion => ctx.conversion_probability < 0.3,
            Signal::MultipleObjections => ctx.objection_count >= 2,
            Signal::AnyObjection => ctx.objection_count >= 1,
            Signal::PriceMentioned => ctx.price_mentioned,
            Signal::CompetitorMentioned => ctx.competitor_mentioned,
            Signal::RoiNeeds => ctx.has_need_matching(ROI_NEED_TAGS),
            Signal::RelationshipNeeds => ctx.has_need_matching(RELATIONSHIP_NEED_TAGS),
            Signal::ImmediateHighConversion => {
                Signal::ImmediateTimeline.is_active(ctx) && Signal::HighConversion.is_active(ctx)
            },
        }
    }
}

/// Base score plus per-signal contributions
#[derive(Debug, Clone, Copy)]
pub struct SignalTable {
    pub base: f32,
    pub contributions: &'static [(Signal, f32)],
}

impl SignalTable {
    pub fn score(&self, ctx: &ConversationContext) -> f32 {
        let total: f32 = self
            .contributions
            .iter()
            .filter(|(signal, _)| signal.is_active(ctx))
            .map(|(_, weight)| weight)
            .sum();
        (self.base + total).clamp(0.0, 1.0)
    }

    /// Active signals and their contributions
    pub fn explain(&self, ctx: &ConversationContext) -> Vec<(Signal, f32)> {
        self.contributions
            .iter()
            .filter(|(signal, _)| signal.is_active(ctx))
            .copied()
            .collect()
    }
}

static AGGRESSIVE: SignalTable = SignalTable {
    base: 0.3,
    contributions: &[
        (Signal::HighEngagement, 0.2),
        (Signal::PositiveSentiment, 0.15),
        (Signal::LateStage, 0.1),
        (Signal::ImmediateHighConversion, 0.25),
        (Signal::MultipleObjections, -0.2),
        (Signal::NegativeSentiment, -0.2),
    ],
};

static CONSERVATIVE: SignalTable = SignalTable {
    base: 0.3,
    contributions: &[
        (Signal::LowEngagement, 0.2),
        (Signal::NegativeSentiment, 0.2),
        (Signal::MultipleObjections, 0.25),
        (Signal::HighConversion, -0.15),
        (Signal::ImmediateTimeline, -0.1),
    ],
};

static ADAPTIVE: SignalTable = SignalTable {
    base: 0.4,
    contributions: &[
        (Signal::ModerateConversion, 0.15),
        (Signal::AnyObjection, 0.05),
        (Signal::EarlyStage, -0.05),
    ],
};

static EMPATHETIC: SignalTable = SignalTable {
    base: 0.25,
    contributions: &[
        (Signal::NegativeSentiment, 0.35),
        (Signal::AnyObjection, 0.1),
        (Signal::LowEngagement, 0.1),
        (Signal::PositiveSentiment, -0.1),
    ],
};

static VALUE_FOCUSED: SignalTable = SignalTable {
    base: 0.25,
    contributions: &[
        (Signal::PriceMentioned, 0.25),
        (Signal::RoiNeeds, 0.25),
        (Signal::CompetitorMentioned, 0.1),
    ],
};

static URGENCY_BASED: SignalTable = SignalTable {
    base: 0.2,
    contributions: &[
        (Signal::ImmediateTimeline, 0.3),
        (Signal::ShortTermTimeline, 0.15),
        (Signal::HighConversion, 0.15),
        (Signal::LongTermTimeline, -0.2),
        (Signal::MultipleObjections, -0.1),
    ],
};

static RELATIONSHIP_BUILDING: SignalTable = SignalTable {
    base: 0.25,
    contributions: &[
        (Signal::EarlyStage, 0.2),
        (Signal::RelationshipNeeds, 0.2),
        (Signal::LongTermTimeline, 0.15),
        (Signal::LowConversion, 0.1),
        (Signal::ImmediateTimeline, -0.1),
    ],
};

pub fn table(kind: StrategyKind) -> &'static SignalTable {
    match kind {
        StrategyKind::Aggressive => &AGGRESSIVE,
        StrategyKind::Conservative => &CONSERVATIVE,
        StrategyKind::Adaptive => &ADAPTIVE,
        StrategyKind::Empathetic => &EMPATHETIC,
        StrategyKind::ValueFocused => &VALUE_FOCUSED,
        StrategyKind::UrgencyBased => &URGENCY_BASED,
        StrategyKind::RelationshipBuilding => &RELATIONSHIP_BUILDING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ConversationContext {
        ConversationContext {
            message_count: 6,
            ..ConversationContext::default()
        }
    }

    fn with(signal_ctx: impl FnOnce(&mut ConversationContext)) -> ConversationContext {
        let mut c = ctx();
        signal_ctx(&mut c);
        c
    }

    #[test]
    fn test_scores_stay_in_unit_range() {
        let extremes = [
            with(|c| {
                c.engagement_score = 1.0;
                c.customer_sentiment = 1.0;
                c.message_count = 40;
                c.decision_timeline = DecisionTimeline::Immediate;
                c.conversion_probability = 1.0;
            }),
            with(|c| {
                c.engagement_score = 0.0;
                c.customer_sentiment = -1.0;
                c.objection_count = 9;
                c.message_count = 1;
                c.decision_timeline = DecisionTimeline::LongTerm;
                c.conversion_probability = 0.0;
            }),
        ];
        for c in &extremes {
            for kind in StrategyKind::ALL {
                let score = kind.score(c);
                assert!((0.0..=1.0).contains(&score), "{} scored {}", kind, score);
            }
        }
    }

    #[test]
    fn test_aggressive_directions() {
        let base = StrategyKind::Aggressive.score(&ctx());
        assert!(StrategyKind::Aggressive.score(&with(|c| c.engagement_score = 0.9)) > base);
        assert!(StrategyKind::Aggressive.score(&with(|c| c.customer_sentiment = 0.6)) > base);
        assert!(StrategyKind::Aggressive.score(&with(|c| c.message_count = 15)) > base);
        assert!(
            StrategyKind::Aggressive.score(&with(|c| {
                c.decision_timeline = DecisionTimeline::Immediate;
                c.conversion_probability = 0.85;
            })) > base
        );
        assert!(StrategyKind::Aggressive.score(&with(|c| c.objection_count = 3)) < base);
    }

    #[test]
    fn test_conservative_directions() {
        let base = StrategyKind::Conservative.score(&ctx());
        assert!(StrategyKind::Conservative.score(&with(|c| c.engagement_score = 0.1)) > base);
        assert!(StrategyKind::Conservative.score(&with(|c| c.customer_sentiment = -0.7)) > base);
        assert!(StrategyKind::Conservative.score(&with(|c| c.objection_count = 2)) > base);
    }

    #[test]
    fn test_value_focused_directions() {
        let base = StrategyKind::ValueFocused.score(&ctx());
        assert!(StrategyKind::ValueFocused.score(&with(|c| c.price_mentioned = true)) > base);
        assert!(
            StrategyKind::ValueFocused.score(&with(|c| c.detected_needs = vec!["ROI".to_string()]))
                > base
        );
        assert!(
            StrategyKind::ValueFocused
                .score(&with(|c| c.detected_needs = vec!["business_growth".to_string()]))
                > base
        );
    }

    #[test]
    fn test_explain_lists_active_signals() {
        let c = with(|c| {
            c.price_mentioned = true;
            c.competitor_mentioned = true;
        });
        let active: Vec<Signal> = table(StrategyKind::ValueFocused)
            .explain(&c)
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(active, vec![Signal::PriceMentioned, Signal::CompetitorMentioned]);
        assert!((StrategyKind::ValueFocused.score(&c) - 0.6).abs() < 1e-6);
    }
}
