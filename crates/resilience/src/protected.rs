//! Explicit breaker wrapper
//!
//! `Protected<T>` pairs a collaborator with the breaker that guards it. Every
//! call goes through [`Protected::call`], so the protection policy is visible
//! where the collaborator is used instead of being hidden in a decorator.

use std::future::Future;
use std::sync::Arc;

use crate::breaker::{BreakerError, CircuitBreaker, FailureKind};

pub struct Protected<T: ?Sized> {
    breaker: Arc<CircuitBreaker>,
    target: Arc<T>,
}

impl<T: ?Sized> Clone for Protected<T> {
    fn clone(&self) -> Self {
        Self {
            breaker: Arc::clone(&self.breaker),
            target: Arc::clone(&self.target),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Protected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protected")
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

impl<T: ?Sized> Protected<T> {
    pub fn new(breaker: Arc<CircuitBreaker>, target: Arc<T>) -> Self {
        Self { breaker, target }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Unprotected access to the collaborator
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Invoke `f` on the collaborator through the breaker
    pub async fn call<'a, R, E, F, Fut>(&'a self, f: F) -> Result<R, BreakerError<E>>
    where
        F: FnOnce(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: FailureKind,
    {
        let target: &'a T = &self.target;
        self.breaker.protect(move || f(target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sales_agent_config::BreakerConfig;
    use sales_agent_core::PredictionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[async_trait]
    trait Echo: Send + Sync {
        async fn echo(&self, value: u32) -> Result<u32, PredictionError>;
    }

    #[derive(Default)]
    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Echo for Flaky {
        async fn echo(&self, value: u32) -> Result<u32, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if value == 0 {
                Err(PredictionError::Backend("zero".to_string()))
            } else {
                Ok(value)
            }
        }
    }

    #[tokio::test]
    async fn test_call_routes_through_breaker() {
        let flaky = Arc::new(Flaky::default());
        let breaker = Arc::new(
            CircuitBreaker::new("echo", BreakerConfig::default().with_failure_threshold(2)).unwrap(),
        );
        let target: Arc<dyn Echo> = flaky.clone();
        let protected = Protected::new(breaker, target);

        assert_eq!(protected.call(|e| e.echo(4)).await.unwrap(), 4);
        assert!(protected.call(|e| e.echo(0)).await.is_err());
        assert!(protected.call(|e| e.echo(0)).await.is_err());

        // Open now: the collaborator is not reached
        let rejected = protected.call(|e| e.echo(9)).await.unwrap_err();
        assert!(rejected.is_open());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }
}
