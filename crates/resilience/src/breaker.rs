//! Circuit Breaker Implementation
//!
//! Guards a single unreliable operation with a three-state breaker:
//!
//! - **Closed**: every call passes through. Counted failures increment a
//!   consecutive-failure counter; reaching `failure_threshold` opens the
//!   circuit. Any success resets the counter.
//! - **Open**: calls are rejected with [`CircuitOpenError`] without invoking
//!   the operation. The state is re-evaluated lazily on every read: once
//!   `recovery_timeout` has passed since the last failure the breaker moves to
//!   half-open before the read returns.
//! - **HalfOpen**: up to `half_open_max_calls` trial calls may be in flight.
//!   Any counted failure re-opens the circuit and discards partial successes;
//!   `success_threshold` successes close it.
//!
//! All state lives behind one `parking_lot::Mutex`, so every read-then-write
//! sequence (lazy recovery, half-open admission) is a single critical section.
//! Time is read through `tokio::time::Instant`, which lets tests drive the
//! recovery timeout with a paused clock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use sales_agent_config::constants::breakers::DURATION_HISTORY;
use sales_agent_config::{BreakerConfig, ConfigError};
use sales_agent_core::PredictionError;

/// Classifies an operation error for the breaker
///
/// The returned tag is matched against the breaker's `counted_errors` and
/// `excluded_errors` lists.
pub trait FailureKind {
    fn failure_kind(&self) -> &str;
}

impl FailureKind for PredictionError {
    fn failure_kind(&self) -> &str {
        self.kind()
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Fast-fail rejection; the operation was not invoked
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit breaker '{name}' is {state}, call rejected")]
pub struct CircuitOpenError {
    pub name: String,
    /// `Open`, or `HalfOpen` when every trial slot is taken
    pub state: CircuitState,
}

/// Result error of a protected call
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Rejected by the breaker
    Open(CircuitOpenError),
    /// The operation ran and failed
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open(_) => None,
        }
    }

    pub fn map_inner<F, O>(self, f: O) -> BreakerError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            BreakerError::Open(open) => BreakerError::Open(open),
            BreakerError::Inner(e) => BreakerError::Inner(f(e)),
        }
    }
}

impl<E> From<CircuitOpenError> for BreakerError<E> {
    fn from(err: CircuitOpenError) -> Self {
        BreakerError::Open(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open(open) => write!(f, "{}", open),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for BreakerError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Open(open) => Some(open),
            BreakerError::Inner(e) => Some(e),
        }
    }
}

/// One entry of the transition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Call metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    /// Calls that raised an excluded error kind
    pub ignored_calls: u64,
    /// Admitted calls dropped before completing
    pub cancelled_calls: u64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerMetrics {
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls;
        if completed == 0 {
            0.0
        } else {
            self.successful_calls as f64 / completed as f64
        }
    }
}

/// Observability snapshot of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_calls: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub half_open_max_calls: u32,
    pub recovery_timeout_secs: u64,
    /// Time left before an open circuit admits trials
    pub retry_after_ms: Option<u64>,
    pub metrics: BreakerMetrics,
    /// Most recent transitions, oldest first
    pub recent_transitions: Vec<StateTransition>,
}

const STATUS_TRANSITIONS: usize = 20;

#[derive(Debug, Default)]
struct CallStats {
    total: u64,
    successes: u64,
    failures: u64,
    rejected: u64,
    ignored: u64,
    cancelled: u64,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    durations: VecDeque<Duration>,
}

impl CallStats {
    fn push_duration(&mut self, elapsed: Duration) {
        if self.durations.len() == DURATION_HISTORY {
            self.durations.pop_front();
        }
        self.durations.push_back(elapsed);
    }

    fn snapshot(&self) -> BreakerMetrics {
        let mut samples: Vec<f64> = self
            .durations
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        let avg = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };
        samples.sort_by(|a, b| a.total_cmp(b));
        let p95 = if samples.is_empty() {
            0.0
        } else {
            let idx = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
            samples[idx.min(samples.len() - 1)]
        };

        BreakerMetrics {
            total_calls: self.total,
            successful_calls: self.successes,
            failed_calls: self.failures,
            rejected_calls: self.rejected,
            ignored_calls: self.ignored,
            cancelled_calls: self.cancelled,
            avg_duration_ms: avg,
            p95_duration_ms: p95,
            last_success_at: self.last_success_at,
            last_failure_at: self.last_failure_at,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    last_failure: Option<Instant>,
    /// Bumped on every transition; permits from an older generation are stale
    generation: u64,
    stats: CallStats,
    transitions: Vec<StateTransition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Ignored,
    Cancelled,
}

/// Circuit breaker around one unreliable dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker; invalid thresholds are rejected here
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        config.validate(&format!("breakers.{}", name))?;

        Ok(Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_calls: 0,
                last_failure: None,
                generation: 0,
                stats: CallStats::default(),
                transitions: Vec::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, applying the lazy open -> half-open transition
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call made now would be admitted (does not reserve a slot)
    pub fn is_call_permitted(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => inner.half_open_calls < self.config.half_open_max_calls,
        }
    }

    /// Execute `operation` if the breaker admits it
    ///
    /// Returns `BreakerError::Open` without invoking `operation` when the
    /// circuit is open or every half-open trial slot is taken. Dropping the
    /// returned future mid-call releases the admission slot and records a
    /// cancelled call.
    pub async fn protect<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureKind,
    {
        let permit = self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                permit.settle(Outcome::Success);
                Ok(value)
            },
            Err(err) => {
                let outcome = if self.config.counts_failure(err.failure_kind()) {
                    Outcome::Failure
                } else {
                    Outcome::Ignored
                };
                permit.settle(outcome);
                Err(BreakerError::Inner(err))
            },
        }
    }

    /// Blocking adapter over [`protect`](Self::protect)
    ///
    /// Must not be called from inside an async runtime worker thread.
    pub fn protect_blocking<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: FailureKind,
    {
        futures::executor::block_on(self.protect(|| std::future::ready(operation())))
    }

    /// Force the breaker closed and zero its counters
    ///
    /// The transition log is append-only and keeps its history.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed, "manual reset");
        } else {
            inner.generation += 1;
        }
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_calls = 0;
        inner.last_failure = None;
        inner.stats = CallStats::default();
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Full transition log, oldest first
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.inner.lock().transitions.clone()
    }

    pub fn metrics(&self) -> BreakerMetrics {
        self.inner.lock().stats.snapshot()
    }

    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        let retry_after_ms = match (inner.state, inner.last_failure) {
            (CircuitState::Open, Some(at)) => {
                let ready_at = at + self.config.recovery_timeout();
                Some(ready_at.saturating_duration_since(Instant::now()).as_millis() as u64)
            },
            _ => None,
        };
        let skip = inner.transitions.len().saturating_sub(STATUS_TRANSITIONS);

        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_calls: inner.half_open_calls,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            half_open_max_calls: self.config.half_open_max_calls,
            recovery_timeout_secs: self.config.recovery_timeout_secs,
            retry_after_ms,
            metrics: inner.stats.snapshot(),
            recent_transitions: inner.transitions[skip..].to_vec(),
        }
    }

    fn try_acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.stats.total += 1;

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if inner.half_open_calls < self.config.half_open_max_calls => {
                inner.half_open_calls += 1;
                true
            },
            state => {
                inner.stats.rejected += 1;
                tracing::debug!(breaker = %self.name, state = %state, "Call rejected");
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    state,
                });
            },
        };

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            trial,
            started: Instant::now(),
            settled: false,
        })
    }

    fn complete(&self, generation: u64, trial: bool, elapsed: Duration, outcome: Outcome) {
        let mut inner = self.inner.lock();
        let current = inner.generation == generation;

        if trial && current && inner.state == CircuitState::HalfOpen {
            inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
        }
        if outcome != Outcome::Cancelled {
            inner.stats.push_duration(elapsed);
        }

        match outcome {
            Outcome::Success => {
                inner.stats.successes += 1;
                inner.stats.last_success_at = Some(Utc::now());
                match inner.state {
                    CircuitState::Closed => inner.failure_count = 0,
                    CircuitState::HalfOpen if trial && current => {
                        inner.success_count += 1;
                        if inner.success_count >= self.config.success_threshold {
                            self.transition(&mut inner, CircuitState::Closed, "recovered");
                        }
                    },
                    _ => {},
                }
            },
            Outcome::Failure => {
                inner.stats.failures += 1;
                inner.stats.last_failure_at = Some(Utc::now());
                match inner.state {
                    CircuitState::Closed => {
                        inner.failure_count += 1;
                        inner.last_failure = Some(Instant::now());
                        if inner.failure_count >= self.config.failure_threshold {
                            let reason = format!("{} consecutive failures", inner.failure_count);
                            self.transition(&mut inner, CircuitState::Open, &reason);
                        }
                    },
                    CircuitState::HalfOpen => {
                        self.transition(&mut inner, CircuitState::Open, "failure during half-open trial");
                    },
                    CircuitState::Open => {},
                }
            },
            Outcome::Ignored => inner.stats.ignored += 1,
            Outcome::Cancelled => inner.stats.cancelled += 1,
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .last_failure
            .map(|at| Instant::now() >= at + self.config.recovery_timeout())
            .unwrap_or(true);
        if elapsed {
            self.transition(inner, CircuitState::HalfOpen, "recovery timeout elapsed");
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, reason: &str) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.generation += 1;
        inner.success_count = 0;
        inner.half_open_calls = 0;
        match to {
            CircuitState::Open => {
                inner.failure_count = 0;
                inner.last_failure = Some(Instant::now());
            },
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {},
        }
        inner.transitions.push(StateTransition {
            from,
            to,
            at: Utc::now(),
            reason: reason.to_string(),
        });

        match to {
            CircuitState::Open => {
                tracing::warn!(breaker = %self.name, %from, %to, reason, "Circuit breaker opened")
            },
            _ => tracing::info!(breaker = %self.name, %from, %to, reason, "Circuit breaker state change"),
        }
    }
}

/// Admission slot for one call
///
/// Settling records the outcome; dropping an unsettled permit (the caller's
/// future was cancelled) records a cancelled call and frees the half-open slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    started: Instant,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker
            .complete(self.generation, self.trial, self.started.elapsed(), outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.complete(
                self.generation,
                self.trial,
                self.started.elapsed(),
                Outcome::Cancelled,
            );
        }
    }
}
