//! Conversation context snapshot
//!
//! `ConversationContext` is the immutable input strategies are scored against.
//! It is built fresh for every decision, either by the caller or from the
//! messages and profile via [`ConversationContext::from_conversation`], and is
//! never retained after the decision returns.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::conversation::{CustomerProfile, DecisionTimeline, Message};

static PRICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(price|pricing|cost|costs|rate|rates|interest|fee|fees|charges|expensive|cheap|afford|budget|discount)\b",
    )
    .expect("price pattern is valid")
});

static COMPETITOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(competitor|competitors|other bank|another bank|other provider|alternative|alternatives|compare|comparing|comparison|versus|switch from)\b",
    )
    .expect("competitor pattern is valid")
});

/// Keyword signals detected in the customer's own turns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextSignals {
    pub price_mentioned: bool,
    pub competitor_mentioned: bool,
}

impl ContextSignals {
    pub fn scan(messages: &[Message]) -> Self {
        messages
            .iter()
            .filter(|m| m.is_customer())
            .fold(Self::default(), |acc, m| Self {
                price_mentioned: acc.price_mentioned || PRICE_PATTERN.is_match(&m.content),
                competitor_mentioned: acc.competitor_mentioned
                    || COMPETITOR_PATTERN.is_match(&m.content),
            })
    }
}

/// Per-decision conversation snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub message_count: usize,
    /// Sentiment in [-1, 1]
    pub customer_sentiment: f32,
    /// Engagement in [0, 1]
    pub engagement_score: f32,
    pub objection_count: u32,
    pub price_mentioned: bool,
    pub competitor_mentioned: bool,
    #[serde(default)]
    pub decision_timeline: DecisionTimeline,
    #[serde(default)]
    pub customer_profile: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub detected_needs: Vec<String>,
    /// Conversion probability in [0, 1]
    pub conversion_probability: f32,
    /// Seconds since the conversation started
    #[serde(default)]
    pub time_in_conversation: f64,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self {
            conversation_id: "anonymous".to_string(),
            message_count: 0,
            customer_sentiment: 0.0,
            engagement_score: 0.5,
            objection_count: 0,
            price_mentioned: false,
            competitor_mentioned: false,
            decision_timeline: DecisionTimeline::Unknown,
            customer_profile: HashMap::new(),
            detected_needs: Vec::new(),
            conversion_probability: 0.5,
            time_in_conversation: 0.0,
        }
    }
}

impl ConversationContext {
    /// Build a context from the raw conversation
    ///
    /// Profile attributes (`sentiment`, `engagement_score`, `objection_count`,
    /// `conversion_probability`, `time_in_conversation`, `decision_timeline`)
    /// take precedence; missing ones are estimated from the messages or left at
    /// neutral defaults. Prediction-derived fields are refined later by the
    /// decision engine.
    pub fn from_conversation(messages: &[Message], profile: &CustomerProfile) -> Self {
        let signals = ContextSignals::scan(messages);

        let customer_sentiment = profile
            .get_f64("sentiment")
            .map(|s| s as f32)
            .unwrap_or(0.0);
        let engagement_score = profile
            .get_f64("engagement_score")
            .map(|e| e as f32)
            .unwrap_or_else(|| estimate_engagement(messages));
        let time_in_conversation = profile
            .get_f64("time_in_conversation")
            .unwrap_or_else(|| elapsed_seconds(messages));

        Self {
            conversation_id: profile.conversation_id().to_string(),
            message_count: messages.len(),
            customer_sentiment,
            engagement_score,
            objection_count: profile
                .get_f64("objection_count")
                .map(|c| c.max(0.0) as u32)
                .unwrap_or(0),
            price_mentioned: signals.price_mentioned,
            competitor_mentioned: signals.competitor_mentioned,
            decision_timeline: profile.decision_timeline(),
            customer_profile: profile.attributes.clone(),
            detected_needs: Vec::new(),
            conversion_probability: profile
                .get_f64("conversion_probability")
                .map(|p| p as f32)
                .unwrap_or(0.5),
            time_in_conversation,
        }
        .normalized()
    }

    /// Clamp every bounded field into its documented range
    pub fn normalized(mut self) -> Self {
        self.customer_sentiment = clamp_finite(self.customer_sentiment, -1.0, 1.0, 0.0);
        self.engagement_score = clamp_finite(self.engagement_score, 0.0, 1.0, 0.5);
        self.conversion_probability = clamp_finite(self.conversion_probability, 0.0, 1.0, 0.5);
        if !self.time_in_conversation.is_finite() || self.time_in_conversation < 0.0 {
            self.time_in_conversation = 0.0;
        }
        self
    }

    /// Whether any detected need tag contains one of `fragments`
    pub fn has_need_matching(&self, fragments: &[&str]) -> bool {
        self.detected_needs.iter().any(|need| {
            let need = need.to_ascii_lowercase();
            fragments.iter().any(|f| need.contains(f))
        })
    }
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Share of customer turns blended with their average length
fn estimate_engagement(messages: &[Message]) -> f32 {
    let customer: Vec<&Message> = messages.iter().filter(|m| m.is_customer()).collect();
    if customer.is_empty() {
        return 0.0;
    }
    let turns = (customer.len() as f32 / 5.0).min(1.0);
    let avg_chars =
        customer.iter().map(|m| m.content.chars().count()).sum::<usize>() as f32 / customer.len() as f32;
    let depth = (avg_chars / 100.0).min(1.0);
    0.5 * turns + 0.5 * depth
}

fn elapsed_seconds(messages: &[Message]) -> f64 {
    let mut stamps = messages.iter().filter_map(|m| m.timestamp);
    match (stamps.next(), stamps.last()) {
        (Some(first), Some(last)) => (last - first).num_milliseconds().max(0) as f64 / 1000.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn test_keyword_signals_only_read_customer_turns() {
        let messages = vec![
            Message::assistant("Our interest rate is the lowest around"),
            Message::user("I was comparing with another bank"),
        ];
        let signals = ContextSignals::scan(&messages);
        assert!(!signals.price_mentioned);
        assert!(signals.competitor_mentioned);
    }

    #[test]
    fn test_profile_attributes_take_precedence() {
        let profile = CustomerProfile::new()
            .with_session("s-1")
            .with_attribute("sentiment", json!(0.6))
            .with_attribute("engagement_score", json!(0.9))
            .with_attribute("decision_timeline", json!("immediate"));
        let ctx = ConversationContext::from_conversation(&[Message::user("hi")], &profile);

        assert_eq!(ctx.conversation_id, "s-1");
        assert_eq!(ctx.message_count, 1);
        assert!((ctx.customer_sentiment - 0.6).abs() < f32::EPSILON);
        assert!((ctx.engagement_score - 0.9).abs() < f32::EPSILON);
        assert_eq!(ctx.decision_timeline, DecisionTimeline::Immediate);
        assert_eq!(ctx.conversion_probability, 0.5);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let profile = CustomerProfile::new()
            .with_attribute("sentiment", json!(-4.0))
            .with_attribute("conversion_probability", json!(3.0));
        let ctx = ConversationContext::from_conversation(&[], &profile);
        assert_eq!(ctx.customer_sentiment, -1.0);
        assert_eq!(ctx.conversion_probability, 1.0);
        assert_eq!(ctx.engagement_score, 0.0);
    }

    #[test]
    fn test_elapsed_time_from_timestamps() {
        let start = Utc::now();
        let mut first = Message::user("hello");
        first.timestamp = Some(start);
        let mut last = Message::user("what does it cost?");
        last.timestamp = Some(start + Duration::seconds(90));

        let ctx = ConversationContext::from_conversation(&[first, last], &CustomerProfile::new());
        assert!((ctx.time_in_conversation - 90.0).abs() < 0.01);
        assert!(ctx.price_mentioned);
    }

    #[test]
    fn test_need_matching() {
        let ctx = ConversationContext {
            detected_needs: vec!["ROI_tracking".to_string()],
            ..Default::default()
        };
        assert!(ctx.has_need_matching(&["roi", "growth"]));
        assert!(!ctx.has_need_matching(&["support"]));
    }
}
