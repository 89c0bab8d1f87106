//! Application State
//!
//! Shared state across all handlers.

use parking_lot::RwLock;
use std::sync::Arc;

use sales_agent_config::{load_settings, Settings};
use sales_agent_decision::{DecisionEngine, MetricsFacadeSink, Predictors};
use sales_agent_resilience::BreakerRegistry;

use crate::predictors::RemotePredictor;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration wrapped in RwLock for hot-reload support
    pub config: Arc<RwLock<Settings>>,
    /// Breakers shared by every engine this process builds
    pub registry: Arc<BreakerRegistry>,
    engine: Arc<RwLock<Arc<DecisionEngine>>>,
    /// Environment name for config reload
    env: Option<String>,
}

impl AppState {
    /// Build state and a decision engine wired to the configured predictors
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        Self::with_env(config, None)
    }

    pub fn with_env(config: Settings, env: Option<String>) -> Result<Self, ServerError> {
        let registry = Arc::new(BreakerRegistry::new());
        let engine = build_engine(&config, &registry)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            engine: Arc::new(RwLock::new(Arc::new(engine))),
            env,
        })
    }

    /// Wrap an engine built elsewhere; it must use `registry`
    pub fn with_engine(config: Settings, registry: Arc<BreakerRegistry>, engine: DecisionEngine) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            engine: Arc::new(RwLock::new(Arc::new(engine))),
            env: None,
        }
    }

    /// Current decision engine
    pub fn engine(&self) -> Arc<DecisionEngine> {
        Arc::clone(&self.engine.read())
    }

    /// Reload configuration from files and rebuild the engine
    ///
    /// Breakers live in the shared registry and keep their state; in-flight
    /// decisions finish on the engine they started with.
    pub fn reload_config(&self) -> Result<(), ServerError> {
        let new_config = load_settings(self.env.as_deref())?;
        let engine = build_engine(&new_config, &self.registry)?;

        *self.engine.write() = Arc::new(engine);
        *self.config.write() = new_config;

        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}

fn build_engine(config: &Settings, registry: &Arc<BreakerRegistry>) -> Result<DecisionEngine, ServerError> {
    let predictors = match RemotePredictor::from_config(&config.predictors)? {
        Some(remote) => {
            tracing::info!(endpoint = %remote.endpoint(), "Using remote prediction service");
            remote.into_predictors()
        },
        None => {
            tracing::warn!("No prediction endpoint configured; decisions use context defaults only");
            Predictors::new()
        },
    };

    let mut builder = DecisionEngine::builder(config.decision.clone())
        .breakers(config.breakers.clone())
        .cache(config.cache.clone())
        .predictors(predictors)
        .registry(Arc::clone(registry));
    if config.observability.metrics_enabled {
        builder = builder.metrics(Arc::new(MetricsFacadeSink));
    }
    Ok(builder.build()?)
}
