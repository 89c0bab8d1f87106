//! Decision engine configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::decision;
use crate::ConfigError;

/// How much analysis a decision gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    /// All three predictions, threshold-based action
    #[default]
    Standard,
    /// Conversion probability only, at half the time budget
    Fast,
    /// All predictions at double the budget, strategy comparison, weighted action scoring
    Accurate,
    /// Standard gathering with maximal cache reuse
    Cached,
}

impl OptimizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMode::Standard => "standard",
            OptimizationMode::Fast => "fast",
            OptimizationMode::Accurate => "accurate",
            OptimizationMode::Cached => "cached",
        }
    }
}

impl std::fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(OptimizationMode::Standard),
            "fast" => Ok(OptimizationMode::Fast),
            "accurate" => Ok(OptimizationMode::Accurate),
            "cached" => Ok(OptimizationMode::Cached),
            other => Err(ConfigError::invalid(
                "decision.optimization_mode",
                format!("Unknown mode '{}'", other),
            )),
        }
    }
}

/// Decision engine configuration
///
/// Constructed once per engine instance and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// Cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    #[serde(default = "default_true")]
    pub enable_circuit_breaker: bool,

    #[serde(default)]
    pub optimization_mode: OptimizationMode,

    /// Prediction budget in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    #[serde(default = "default_true")]
    pub enable_advanced_strategies: bool,

    #[serde(default = "default_true")]
    pub parallel_processing: bool,

    /// Extra attempts per failed prediction call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_true() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    decision::DEFAULT_CACHE_TTL_SECS
}
fn default_timeout_seconds() -> f64 {
    decision::DEFAULT_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    decision::DEFAULT_MAX_RETRIES
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_ttl: default_cache_ttl(),
            enable_circuit_breaker: true,
            optimization_mode: OptimizationMode::Standard,
            timeout_seconds: default_timeout_seconds(),
            enable_advanced_strategies: true,
            parallel_processing: true,
            max_retries: default_max_retries(),
        }
    }
}

impl DecisionConfig {
    pub fn with_mode(mut self, mode: OptimizationMode) -> Self {
        self.optimization_mode = mode;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// Cached mode keeps the cache on regardless of `enable_cache`
    pub fn cache_active(&self) -> bool {
        self.enable_cache || self.optimization_mode == OptimizationMode::Cached
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err(ConfigError::invalid(
                "decision.timeout_seconds",
                format!("Must be positive, got {}", self.timeout_seconds),
            ));
        }
        if self.timeout_seconds > 300.0 {
            return Err(ConfigError::invalid(
                "decision.timeout_seconds",
                "Too high (maximum 300s)",
            ));
        }
        if self.cache_active() && self.cache_ttl == 0 {
            return Err(ConfigError::invalid(
                "decision.cache_ttl",
                "Must be at least 1 second when caching is enabled",
            ));
        }
        if self.max_retries > 10 {
            tracing::warn!(
                max_retries = self.max_retries,
                "decision.max_retries is unusually high; every retry spends the shared time budget"
            );
        }
        Ok(())
    }
}
