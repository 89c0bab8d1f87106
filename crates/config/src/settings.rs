//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::{BreakersConfig, ConfigError, DecisionConfig};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Decision engine configuration
    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub breakers: BreakersConfig,

    /// Remote prediction service
    #[serde(default)]
    pub predictors: PredictorsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decision.validate()?;
        self.cache.validate()?;
        self.breakers.validate()?;
        self.validate_server()?;
        self.validate_predictors()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Must be non-zero"));
        }
        if self.environment.is_production() && self.server.cors_origins.is_empty() {
            tracing::warn!("server.cors_origins is empty in production; only localhost is allowed");
        }
        Ok(())
    }

    fn validate_predictors(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.predictors.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    "predictors.endpoint",
                    format!("Must be an http(s) URL, got '{}'", endpoint),
                ));
            }
        }
        if self.predictors.request_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "predictors.request_timeout_ms",
                "Must be at least 1",
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (empty = localhost only)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

/// Decision cache sizing and fingerprint window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Most recent messages folded into the fingerprint
    #[serde(default = "default_message_window")]
    pub message_window: usize,

    /// Per-message content prefix folded into the fingerprint
    #[serde(default = "default_message_truncate_chars")]
    pub message_truncate_chars: usize,
}

fn default_max_entries() -> usize {
    cache::DEFAULT_MAX_ENTRIES
}
fn default_message_window() -> usize {
    cache::DEFAULT_MESSAGE_WINDOW
}
fn default_message_truncate_chars() -> usize {
    cache::DEFAULT_MESSAGE_TRUNCATE_CHARS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            message_window: default_message_window(),
            message_truncate_chars: default_message_truncate_chars(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "Must be at least 1"));
        }
        if self.message_window == 0 {
            return Err(ConfigError::invalid("cache.message_window", "Must be at least 1"));
        }
        if self.message_truncate_chars == 0 {
            return Err(ConfigError::invalid(
                "cache.message_truncate_chars",
                "Must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Remote prediction service; no endpoint means no predictors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorsConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional bearer token for the prediction service
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

impl Default for PredictorsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
            api_key: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (SALES_AGENT_ prefix, e.g. `SALES_AGENT_DECISION__TIMEOUT_SECONDS`)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("SALES_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OptimizationMode;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.cache.max_entries, 1000);
        assert!(settings.predictors.endpoint.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
decision:
  optimization_mode: accurate
  timeout_seconds: 2.5
breakers:
  engine:
    failure_threshold: 7
"#;
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.decision.optimization_mode, OptimizationMode::Accurate);
        assert_eq!(settings.decision.timeout_seconds, 2.5);
        assert!(settings.decision.enable_cache);
        assert_eq!(settings.breakers.engine.failure_threshold, 7);
        assert_eq!(settings.breakers.engine.recovery_timeout_secs, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cache_validation() {
        let mut settings = Settings::default();
        settings.cache.max_entries = 0;
        assert!(settings.validate().is_err());
        settings.cache.max_entries = 10;
        settings.cache.message_window = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_predictor_endpoint_validation() {
        let mut settings = Settings::default();
        settings.predictors.endpoint = Some("localhost:9000".to_string());
        assert!(settings.validate().is_err());
        settings.predictors.endpoint = Some("http://localhost:9000".to_string());
        assert!(settings.validate().is_ok());
        settings.predictors.request_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_breaker_validation_propagates() {
        let mut settings = Settings::default();
        settings.breakers.engine.failure_threshold = 0;
        match settings.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "breakers.engine.failure_threshold")
            },
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_server_port_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
    }
}
