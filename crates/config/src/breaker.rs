//! Circuit breaker configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::breakers;
use crate::ConfigError;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive counted failures that open the circuit (>= 1)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds to stay open before admitting half-open trials (>= 1)
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,

    /// Half-open successes required to close again (>= 1)
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Concurrent half-open trial calls (>= 1)
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,

    /// Error kinds counted as failures; empty means every kind counts
    #[serde(default)]
    pub counted_errors: Vec<String>,

    /// Error kinds that never count, even if listed in `counted_errors`
    #[serde(default)]
    pub excluded_errors: Vec<String>,
}

fn default_failure_threshold() -> u32 {
    breakers::DEFAULT_FAILURE_THRESHOLD
}
fn default_recovery_timeout_secs() -> u64 {
    breakers::DEFAULT_RECOVERY_TIMEOUT_SECS
}
fn default_success_threshold() -> u32 {
    breakers::DEFAULT_SUCCESS_THRESHOLD
}
fn default_half_open_max_calls() -> u32 {
    breakers::DEFAULT_HALF_OPEN_MAX_CALLS
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            success_threshold: default_success_threshold(),
            half_open_max_calls: default_half_open_max_calls(),
            counted_errors: Vec::new(),
            excluded_errors: Vec::new(),
        }
    }
}

impl BreakerConfig {
    /// Defaults for the per-predictor breakers
    pub fn predictor_default() -> Self {
        Self {
            failure_threshold: breakers::PREDICTOR_FAILURE_THRESHOLD,
            recovery_timeout_secs: breakers::PREDICTOR_RECOVERY_TIMEOUT_SECS,
            ..Self::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout_secs(mut self, secs: u64) -> Self {
        self.recovery_timeout_secs = secs;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    pub fn excluding(mut self, kind: impl Into<String>) -> Self {
        self.excluded_errors.push(kind.into());
        self
    }

    pub fn counting(mut self, kind: impl Into<String>) -> Self {
        self.counted_errors.push(kind.into());
        self
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    /// Whether an error of `kind` counts toward opening the circuit
    pub fn counts_failure(&self, kind: &str) -> bool {
        if self.excluded_errors.iter().any(|k| k == kind) {
            return false;
        }
        self.counted_errors.is_empty() || self.counted_errors.iter().any(|k| k == kind)
    }

    /// Validate thresholds; `field` prefixes the reported field name
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.failure_threshold < 1 {
            return Err(ConfigError::invalid(
                format!("{}.failure_threshold", field),
                "Must be at least 1",
            ));
        }
        if self.recovery_timeout_secs < 1 {
            return Err(ConfigError::invalid(
                format!("{}.recovery_timeout_secs", field),
                "Must be at least 1 second",
            ));
        }
        if self.success_threshold < 1 {
            return Err(ConfigError::invalid(
                format!("{}.success_threshold", field),
                "Must be at least 1",
            ));
        }
        if self.half_open_max_calls < 1 {
            return Err(ConfigError::invalid(
                format!("{}.half_open_max_calls", field),
                "Must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Breaker settings for the whole decision layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakersConfig {
    /// Top-level breaker around every decision
    #[serde(default)]
    pub engine: BreakerConfig,

    /// Default for the three prediction breakers
    #[serde(default = "BreakerConfig::predictor_default")]
    pub predictors: BreakerConfig,

    /// Per-breaker overrides keyed by breaker name
    #[serde(default)]
    pub overrides: HashMap<String, BreakerConfig>,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            engine: BreakerConfig::default(),
            predictors: BreakerConfig::predictor_default(),
            overrides: HashMap::new(),
        }
    }
}

impl BreakersConfig {
    /// Config for a predictor breaker, honouring overrides
    pub fn for_predictor(&self, name: &str) -> BreakerConfig {
        self.overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.predictors.clone())
    }

    /// Config for the engine breaker, honouring overrides
    pub fn for_engine(&self) -> BreakerConfig {
        self.overrides
            .get(breakers::DECISION_ENGINE)
            .cloned()
            .unwrap_or_else(|| self.engine.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate("breakers.engine")?;
        self.predictors.validate("breakers.predictors")?;
        for (name, config) in &self.overrides {
            config.validate(&format!("breakers.overrides.{}", name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout(), Duration::from_secs(30));
        assert!(config.validate("engine").is_ok());
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        assert!(BreakerConfig::default()
            .with_failure_threshold(0)
            .validate("b")
            .is_err());
        assert!(BreakerConfig::default()
            .with_recovery_timeout_secs(0)
            .validate("b")
            .is_err());
        assert!(BreakerConfig::default()
            .with_success_threshold(0)
            .validate("b")
            .is_err());
        assert!(BreakerConfig::default()
            .with_half_open_max_calls(0)
            .validate("b")
            .is_err());
    }

    #[test]
    fn test_failure_classification() {
        let all = BreakerConfig::default();
        assert!(all.counts_failure("backend"));

        let filtered = BreakerConfig::default()
            .counting("backend")
            .counting("timeout")
            .excluding("timeout");
        assert!(filtered.counts_failure("backend"));
        assert!(!filtered.counts_failure("timeout"));
        assert!(!filtered.counts_failure("invalid_response"));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = BreakersConfig::default();
        config.overrides.insert(
            breakers::NEEDS.to_string(),
            BreakerConfig::default().with_failure_threshold(9),
        );
        assert_eq!(config.for_predictor(breakers::NEEDS).failure_threshold, 9);
        assert_eq!(
            config.for_predictor(breakers::CONVERSION).failure_threshold,
            breakers::PREDICTOR_FAILURE_THRESHOLD
        );
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = BreakersConfig::default();
        config
            .overrides
            .insert("custom".to_string(), BreakerConfig::default().with_failure_threshold(0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("breakers.overrides.custom"));
    }
}
