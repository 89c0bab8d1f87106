//! Strategy decision trees

use sales_agent_core::{ConversationContext, DecisionTimeline};

use super::scoring::Signal;
use super::{StrategyDecision, StrategyKind};
use crate::actions::SalesAction;

pub fn execute(kind: StrategyKind, ctx: &ConversationContext) -> StrategyDecision {
    let (action, confidence, urgency, reasoning, fallback) = match kind {
        StrategyKind::Aggressive => aggressive(ctx),
        StrategyKind::Conservative => conservative(ctx),
        StrategyKind::Adaptive => adaptive(ctx),
        StrategyKind::Empathetic => empathetic(ctx),
        StrategyKind::ValueFocused => value_focused(ctx),
        StrategyKind::UrgencyBased => urgency_based(ctx),
        StrategyKind::RelationshipBuilding => relationship_building(ctx),
    };

    StrategyDecision {
        strategy: kind,
        recommended_action: action.as_str().to_string(),
        confidence: confidence.clamp(0.0, 1.0),
        reasoning,
        fallback_action: fallback.map(|a| a.as_str().to_string()),
        urgency_level: urgency.min(10),
    }
}

type Branch = (SalesAction, f32, u8, String, Option<SalesAction>);

fn aggressive(ctx: &ConversationContext) -> Branch {
    if ctx.conversion_probability > 0.7 && ctx.objection_count == 0 {
        (
            SalesAction::AttemptClose,
            ctx.conversion_probability,
            9,
            format!(
                "Conversion likelihood {:.2} with no open objections; ask for the commitment",
                ctx.conversion_probability
            ),
            Some(SalesAction::TrialClose),
        )
    } else if Signal::HighEngagement.is_active(ctx) {
        (
            SalesAction::TrialClose,
            0.7,
            8,
            "Customer is highly engaged; test readiness with a trial close".to_string(),
            Some(SalesAction::PresentValue),
        )
    } else if ctx.objection_count > 0 {
        (
            SalesAction::HandleObjection,
            0.6,
            7,
            format!("{} objection(s) block the close; resolve them first", ctx.objection_count),
            Some(SalesAction::TrialClose),
        )
    } else {
        (
            SalesAction::CreateUrgency,
            0.55,
            7,
            "No strong buying signal yet; give a reason to act now".to_string(),
            Some(SalesAction::NurtureInterest),
        )
    }
}

fn conservative(ctx: &ConversationContext) -> Branch {
    if Signal::MultipleObjections.is_active(ctx) {
        (
            SalesAction::HandleObjection,
            0.75,
            4,
            format!("{} objections raised; address concerns without pressure", ctx.objection_count),
            Some(SalesAction::BuildRapport),
        )
    } else if Signal::NegativeSentiment.is_active(ctx) {
        (
            SalesAction::Empathize,
            0.7,
            3,
            "Customer sentiment is negative; acknowledge it before moving on".to_string(),
            Some(SalesAction::BuildRapport),
        )
    } else if Signal::LowEngagement.is_active(ctx) {
        (
            SalesAction::QualifyNeeds,
            0.6,
            3,
            "Low engagement; ask open questions to find what matters".to_string(),
            Some(SalesAction::NurtureInterest),
        )
    } else {
        (
            SalesAction::NurtureInterest,
            0.6,
            3,
            "Keep the conversation steady and informative".to_string(),
            Some(SalesAction::ScheduleFollowUp),
        )
    }
}

fn adaptive(ctx: &ConversationContext) -> Branch {
    if ctx.objection_count > 0 {
        (
            SalesAction::HandleObjection,
            0.65,
            6,
            "Mixed signals with open objections; handle them and reassess".to_string(),
            Some(SalesAction::PresentValue),
        )
    } else if ctx.conversion_probability > 0.6 {
        (
            SalesAction::TrialClose,
            ctx.conversion_probability * 0.9,
            7,
            format!(
                "Conversion likelihood {:.2} is trending up; probe readiness",
                ctx.conversion_probability
            ),
            Some(SalesAction::PresentValue),
        )
    } else if !ctx.detected_needs.is_empty() {
        (
            SalesAction::PresentValue,
            0.6,
            5,
            format!("Map the offer onto needs: {}", ctx.detected_needs.join(", ")),
            Some(SalesAction::QualifyNeeds),
        )
    } else {
        (
            SalesAction::QualifyNeeds,
            0.55,
            4,
            "Not enough signal yet; learn more about the customer".to_string(),
            Some(SalesAction::BuildRapport),
        )
    }
}

fn empathetic(ctx: &ConversationContext) -> Branch {
    if Signal::NegativeSentiment.is_active(ctx) {
        (
            SalesAction::Empathize,
            0.8,
            2,
            "Customer is frustrated; lead with empathy".to_string(),
            Some(SalesAction::BuildRapport),
        )
    } else if ctx.objection_count > 0 {
        (
            SalesAction::HandleObjection,
            0.65,
            4,
            "Acknowledge the concern and answer it gently".to_string(),
            Some(SalesAction::Empathize),
        )
    } else {
        (
            SalesAction::BuildRapport,
            0.6,
            3,
            "Strengthen the personal connection".to_string(),
            None,
        )
    }
}

fn value_focused(ctx: &ConversationContext) -> Branch {
    if ctx.competitor_mentioned {
        (
            SalesAction::PresentValue,
            0.75,
            6,
            "Customer is comparing providers; differentiate on value".to_string(),
            Some(SalesAction::DemonstrateRoi),
        )
    } else if ctx.price_mentioned || Signal::RoiNeeds.is_active(ctx) {
        (
            SalesAction::DemonstrateRoi,
            0.75,
            6,
            "Price or return is on the customer's mind; quantify the benefit".to_string(),
            Some(SalesAction::PresentValue),
        )
    } else {
        (
            SalesAction::PresentValue,
            0.6,
            5,
            "Explain the core value of the offer".to_string(),
            Some(SalesAction::QualifyNeeds),
        )
    }
}

fn urgency_based(ctx: &ConversationContext) -> Branch {
    match ctx.decision_timeline {
        DecisionTimeline::Immediate if ctx.conversion_probability > 0.6 => (
            SalesAction::AttemptClose,
            ctx.conversion_probability.max(0.7),
            9,
            "Customer wants to decide now and is likely to convert".to_string(),
            Some(SalesAction::CreateUrgency),
        ),
        DecisionTimeline::Immediate | DecisionTimeline::ShortTerm => (
            SalesAction::CreateUrgency,
            0.7,
            8,
            format!(
                "Decision timeline is {}; highlight time-bound benefits",
                ctx.decision_timeline.as_str()
            ),
            Some(SalesAction::TrialClose),
        ),
        DecisionTimeline::LongTerm => (
            SalesAction::ScheduleFollowUp,
            0.6,
            4,
            "Long decision horizon; agree on a follow-up".to_string(),
            Some(SalesAction::NurtureInterest),
        ),
        DecisionTimeline::Unknown => (
            SalesAction::CreateUrgency,
            0.5,
            6,
            "Timeline unknown; introduce a reason to decide soon".to_string(),
            Some(SalesAction::QualifyNeeds),
        ),
    }
}

fn relationship_building(ctx: &ConversationContext) -> Branch {
    if Signal::EarlyStage.is_active(ctx) {
        (
            SalesAction::BuildRapport,
            0.7,
            2,
            "Early in the conversation; build trust first".to_string(),
            Some(SalesAction::QualifyNeeds),
        )
    } else if Signal::RelationshipNeeds.is_active(ctx) {
        (
            SalesAction::NurtureInterest,
            0.7,
            3,
            "Customer values support and trust; show long-term commitment".to_string(),
            Some(SalesAction::BuildRapport),
        )
    } else if Signal::PositiveSentiment.is_active(ctx) {
        (
            SalesAction::NurtureInterest,
            0.65,
            4,
            "Positive rapport; deepen the relationship".to_string(),
            Some(SalesAction::PresentValue),
        )
    } else {
        (
            SalesAction::BuildRapport,
            0.6,
            3,
            "Invest in the relationship before selling".to_string(),
            Some(SalesAction::ScheduleFollowUp),
        )
    }
}
