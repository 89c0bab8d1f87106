//! Process-wide breaker registry
//!
//! Breakers are keyed by name. `get_or_create` returns the same instance for
//! the same name for the life of the registry, even under concurrent first use.
//! The registry is passed around as an `Arc`; there is no global instance.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use sales_agent_config::{BreakerConfig, ConfigError};

use crate::breaker::{BreakerStatus, CircuitBreaker};

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose implicitly created breakers use `config`
    pub fn with_default_config(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: config,
        }
    }

    /// Fetch the breaker registered under `name`, creating it on first use
    ///
    /// `config` only applies when the breaker does not exist yet; an existing
    /// breaker keeps the configuration it was created with.
    pub fn get_or_create(
        &self,
        name: &str,
        config: Option<BreakerConfig>,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        let entry = self.breakers.entry(name.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let config = config.unwrap_or_else(|| self.default_config.clone());
                let breaker = Arc::new(CircuitBreaker::new(name, config)?);
                tracing::debug!(breaker = %name, "Registered circuit breaker");
                Ok(Arc::clone(vacant.insert(breaker).value()))
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Status of every registered breaker, ordered by name
    pub fn list_all(&self) -> BTreeMap<String, BreakerStatus> {
        // Collect handles first so no shard lock is held while a breaker locks
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| Arc::clone(e.value())).collect();
        handles
            .into_iter()
            .map(|b| (b.name().to_string(), b.status()))
            .collect()
    }

    pub fn reset_all(&self) {
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| Arc::clone(e.value())).collect();
        for breaker in &handles {
            breaker.reset();
        }
        tracing::info!(count = handles.len(), "All circuit breakers reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CircuitState;

    #[test]
    fn test_same_name_same_instance() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("svc", None).unwrap();
        let b = registry
            .get_or_create("svc", Some(BreakerConfig::default().with_failure_threshold(1)))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // First configuration wins
        assert_eq!(b.config().failure_threshold, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_config_not_registered() {
        let registry = BreakerRegistry::new();
        let result =
            registry.get_or_create("bad", Some(BreakerConfig::default().with_success_threshold(0)));
        assert!(result.is_err());
        assert!(registry.get("bad").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_default_config_applies() {
        let registry =
            BreakerRegistry::with_default_config(BreakerConfig::default().with_failure_threshold(2));
        let breaker = registry.get_or_create("svc", None).unwrap();
        assert_eq!(breaker.config().failure_threshold, 2);
    }

    #[test]
    fn test_list_all_sorted() {
        let registry = BreakerRegistry::new();
        registry.get_or_create("zeta", None).unwrap();
        registry.get_or_create("alpha", None).unwrap();

        let all = registry.list_all();
        let names: Vec<_> = all.keys().cloned().collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
        assert!(all.values().all(|s| s.state == CircuitState::Closed));
        assert_eq!(registry.names(), names);
    }
}
