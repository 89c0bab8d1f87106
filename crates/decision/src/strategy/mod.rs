//! Sales strategy catalog and selection
//!
//! Seven fixed strategies are scored against the [`ConversationContext`] with
//! auditable signal tables ([`scoring`]), executed as small decision trees
//! ([`catalog`]) and ranked by `score × weight` in the [`selector`].
//!
//! [`ConversationContext`]: sales_agent_core::ConversationContext

pub mod catalog;
pub mod scoring;
pub mod selector;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use sales_agent_core::ConversationContext;

pub use scoring::{Signal, SignalTable};
pub use selector::{RankedStrategy, StrategySelector};

/// The strategy catalog, in tie-breaking order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Aggressive,
    Conservative,
    Adaptive,
    Empathetic,
    ValueFocused,
    UrgencyBased,
    RelationshipBuilding,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Aggressive,
        StrategyKind::Conservative,
        StrategyKind::Adaptive,
        StrategyKind::Empathetic,
        StrategyKind::ValueFocused,
        StrategyKind::UrgencyBased,
        StrategyKind::RelationshipBuilding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Aggressive => "aggressive",
            StrategyKind::Conservative => "conservative",
            StrategyKind::Adaptive => "adaptive",
            StrategyKind::Empathetic => "empathetic",
            StrategyKind::ValueFocused => "value_focused",
            StrategyKind::UrgencyBased => "urgency_based",
            StrategyKind::RelationshipBuilding => "relationship_building",
        }
    }

    /// Suitability of this strategy for `ctx`, in [0, 1]
    pub fn score(&self, ctx: &ConversationContext) -> f32 {
        scoring::table(*self).score(ctx)
    }

    /// Run this strategy's decision tree
    pub fn execute(&self, ctx: &ConversationContext) -> StrategyDecision {
        catalog::execute(*self, ctx)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown strategy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Outcome of executing one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub strategy: StrategyKind,
    pub recommended_action: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_action: Option<String>,
    /// Urgency in [0, 10]
    pub urgency_level: u8,
}
