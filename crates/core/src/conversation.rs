//! Conversation messages and customer profile types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::CoreError;

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    /// The customer
    User,
    /// The sales agent
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Whether the message was written by the customer
    pub fn is_customer(&self) -> bool {
        self.role == Role::User
    }
}

/// How soon the customer intends to decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTimeline {
    Immediate,
    ShortTerm,
    LongTerm,
    #[default]
    Unknown,
}

impl DecisionTimeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTimeline::Immediate => "immediate",
            DecisionTimeline::ShortTerm => "short_term",
            DecisionTimeline::LongTerm => "long_term",
            DecisionTimeline::Unknown => "unknown",
        }
    }
}

impl FromStr for DecisionTimeline {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "immediate" | "now" => Ok(DecisionTimeline::Immediate),
            "short_term" | "short" => Ok(DecisionTimeline::ShortTerm),
            "long_term" | "long" => Ok(DecisionTimeline::LongTerm),
            "unknown" | "" => Ok(DecisionTimeline::Unknown),
            other => Err(CoreError::UnknownTimeline(other.to_string())),
        }
    }
}

/// Open customer profile
///
/// Only the identifiers are typed; everything else the conversation service
/// knows about the customer travels in `attributes` and is read through the
/// typed accessors below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, flatten)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl CustomerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Identifier used for the conversation: session first, then customer id
    pub fn conversation_id(&self) -> &str {
        self.session_id
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("anonymous")
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(|v| v.as_bool())
    }

    /// Decision timeline attribute; unparseable values read as unknown
    pub fn decision_timeline(&self) -> DecisionTimeline {
        self.get_str("decision_timeline")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeline_parsing() {
        assert_eq!("immediate".parse::<DecisionTimeline>().unwrap(), DecisionTimeline::Immediate);
        assert_eq!("Short-Term".parse::<DecisionTimeline>().unwrap(), DecisionTimeline::ShortTerm);
        assert_eq!("long_term".parse::<DecisionTimeline>().unwrap(), DecisionTimeline::LongTerm);
        assert!("someday".parse::<DecisionTimeline>().is_err());
    }

    #[test]
    fn test_profile_flattened_attributes() {
        let profile: CustomerProfile = serde_json::from_value(json!({
            "id": "cust-7",
            "sentiment": 0.4,
            "decision_timeline": "immediate",
            "returning": true
        }))
        .unwrap();

        assert_eq!(profile.conversation_id(), "cust-7");
        assert_eq!(profile.get_f64("sentiment"), Some(0.4));
        assert_eq!(profile.get_bool("returning"), Some(true));
        assert_eq!(profile.decision_timeline(), DecisionTimeline::Immediate);
    }

    #[test]
    fn test_conversation_id_prefers_session() {
        let profile = CustomerProfile::new().with_id("cust-1").with_session("sess-9");
        assert_eq!(profile.conversation_id(), "sess-9");
        assert_eq!(CustomerProfile::new().conversation_id(), "anonymous");
    }
}
