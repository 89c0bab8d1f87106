//! Fault tolerance for unreliable collaborators
//!
//! Features:
//! - Three-state circuit breaker (closed / open / half-open) with lazy recovery
//! - Failure classification by error kind (counted and excluded kinds)
//! - Per-breaker call metrics and an append-only transition log
//! - Process-wide breaker registry, injected rather than global
//! - Explicit `Protected` wrapper that keeps the policy visible at the call site
//!
//! The breaker is a gate, not a retry mechanism: retries belong to the caller.

pub mod breaker;
pub mod protected;
pub mod registry;

pub use breaker::{
    BreakerError, BreakerMetrics, BreakerStatus, CircuitBreaker, CircuitOpenError, CircuitState,
    FailureKind, StateTransition,
};
pub use protected::Protected;
pub use registry::BreakerRegistry;
