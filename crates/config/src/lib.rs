//! Configuration management for the sales agent
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (SALES_AGENT_ prefix, `__` separator)
//!
//! The decision engine and circuit breakers take their configuration at
//! construction time and never re-read it, so a reload only affects engines
//! built afterwards.

pub mod breaker;
pub mod constants;
pub mod decision;
pub mod settings;

pub use breaker::{BreakerConfig, BreakersConfig};
pub use decision::{DecisionConfig, OptimizationMode};
pub use settings::{
    load_settings, CacheConfig, ObservabilityConfig, PredictorsConfig, RuntimeEnvironment,
    ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
