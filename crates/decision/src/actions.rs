//! Conversational action tags
//!
//! `recommended_action` is free-form on the wire; these are the tags the
//! engine and the built-in strategies produce.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesAction {
    AttemptClose,
    TrialClose,
    HandleObjection,
    PresentValue,
    DemonstrateRoi,
    CreateUrgency,
    NurtureInterest,
    QualifyNeeds,
    BuildRapport,
    Empathize,
    ScheduleFollowUp,
    ContinueConversation,
}

impl SalesAction {
    /// Candidates ranked by accurate-mode action scoring
    pub const CANDIDATES: [SalesAction; 6] = [
        SalesAction::AttemptClose,
        SalesAction::HandleObjection,
        SalesAction::PresentValue,
        SalesAction::NurtureInterest,
        SalesAction::QualifyNeeds,
        SalesAction::BuildRapport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SalesAction::AttemptClose => "attempt_close",
            SalesAction::TrialClose => "trial_close",
            SalesAction::HandleObjection => "handle_objection",
            SalesAction::PresentValue => "present_value",
            SalesAction::DemonstrateRoi => "demonstrate_roi",
            SalesAction::CreateUrgency => "create_urgency",
            SalesAction::NurtureInterest => "nurture_interest",
            SalesAction::QualifyNeeds => "qualify_needs",
            SalesAction::BuildRapport => "build_rapport",
            SalesAction::Empathize => "empathize",
            SalesAction::ScheduleFollowUp => "schedule_follow_up",
            SalesAction::ContinueConversation => "continue_conversation",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        let action = match tag {
            "attempt_close" => SalesAction::AttemptClose,
            "trial_close" => SalesAction::TrialClose,
            "handle_objection" => SalesAction::HandleObjection,
            "present_value" => SalesAction::PresentValue,
            "demonstrate_roi" => SalesAction::DemonstrateRoi,
            "create_urgency" => SalesAction::CreateUrgency,
            "nurture_interest" => SalesAction::NurtureInterest,
            "qualify_needs" => SalesAction::QualifyNeeds,
            "build_rapport" => SalesAction::BuildRapport,
            "empathize" => SalesAction::Empathize,
            "schedule_follow_up" => SalesAction::ScheduleFollowUp,
            "continue_conversation" => SalesAction::ContinueConversation,
            _ => return None,
        };
        Some(action)
    }

    /// The scoring candidate this action belongs to
    pub fn family(&self) -> SalesAction {
        match self {
            SalesAction::TrialClose | SalesAction::CreateUrgency => SalesAction::AttemptClose,
            SalesAction::DemonstrateRoi => SalesAction::PresentValue,
            SalesAction::Empathize => SalesAction::BuildRapport,
            SalesAction::ScheduleFollowUp | SalesAction::ContinueConversation => {
                SalesAction::NurtureInterest
            },
            other => *other,
        }
    }

    /// Urgency attached when the engine picks this action directly
    pub fn default_urgency(&self) -> u8 {
        match self.family() {
            SalesAction::AttemptClose => 8,
            SalesAction::HandleObjection => 6,
            SalesAction::PresentValue => 5,
            SalesAction::NurtureInterest | SalesAction::QualifyNeeds => 4,
            _ => 3,
        }
    }
}

impl std::fmt::Display for SalesAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_parse_back() {
        for action in SalesAction::CANDIDATES {
            assert_eq!(SalesAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(SalesAction::parse("dance"), None);
    }

    #[test]
    fn test_families() {
        assert_eq!(SalesAction::TrialClose.family(), SalesAction::AttemptClose);
        assert_eq!(SalesAction::DemonstrateRoi.family(), SalesAction::PresentValue);
        assert_eq!(SalesAction::HandleObjection.family(), SalesAction::HandleObjection);
        assert_eq!(SalesAction::CreateUrgency.default_urgency(), 8);
        assert_eq!(SalesAction::Empathize.default_urgency(), 3);
    }
}
