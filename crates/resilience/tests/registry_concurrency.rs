//! Registry and breaker behaviour under concurrent use

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sales_agent_config::BreakerConfig;
use sales_agent_core::PredictionError;
use sales_agent_resilience::{BreakerError, BreakerRegistry, CircuitState};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_yields_one_instance() {
    let registry = Arc::new(BreakerRegistry::new());

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create("shared", None).unwrap() })
        })
        .collect();

    let mut breakers = Vec::new();
    for handle in handles {
        breakers.push(handle.await.unwrap());
    }

    assert_eq!(registry.len(), 1);
    let first = &breakers[0];
    assert!(breakers.iter().all(|b| Arc::ptr_eq(first, b)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_once() {
    let registry = BreakerRegistry::new();
    let breaker = registry
        .get_or_create(
            "flaky",
            Some(BreakerConfig::default().with_failure_threshold(5)),
        )
        .unwrap();

    let invoked = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            let invoked = Arc::clone(&invoked);
            tokio::spawn(async move {
                breaker
                    .protect(|| async move {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(PredictionError::Backend("down".to_string()))
                    })
                    .await
            })
        })
        .collect();

    let mut rejected = 0;
    for task in tasks {
        if let Err(BreakerError::Open(_)) = task.await.unwrap() {
            rejected += 1;
        }
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(invoked.load(Ordering::SeqCst) + rejected, 20);
    assert!(invoked.load(Ordering::SeqCst) >= 5);

    let opened = breaker
        .transitions()
        .iter()
        .filter(|t| t.to == CircuitState::Open)
        .count();
    assert_eq!(opened, 1);
}

#[tokio::test]
async fn test_reset_all_closes_every_breaker() {
    let registry = BreakerRegistry::with_default_config(
        BreakerConfig::default().with_failure_threshold(1),
    );

    for name in ["a", "b", "c"] {
        let breaker = registry.get_or_create(name, None).unwrap();
        let _ = breaker
            .protect(|| async { Err::<(), _>(PredictionError::Timeout) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    registry.reset_all();

    let statuses = registry.list_all();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.values().all(|s| s.state == CircuitState::Closed));
    assert!(statuses.values().all(|s| s.metrics.total_calls == 0));
}

#[tokio::test]
async fn test_invalid_input_does_not_trip_predictor_breaker() {
    let registry = BreakerRegistry::new();
    let breaker = registry
        .get_or_create(
            "prediction.needs",
            Some(
                BreakerConfig::predictor_default()
                    .with_failure_threshold(1)
                    .excluding("invalid_input"),
            ),
        )
        .unwrap();

    for _ in 0..10 {
        let result = breaker
            .protect(|| async {
                Err::<(), _>(PredictionError::InvalidInput("empty transcript".to_string()))
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Inner(PredictionError::InvalidInput(_)))));
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}
