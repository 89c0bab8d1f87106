//! Metrics sink interface
//!
//! Events are fire-and-forget: `record` returns nothing, and a sink that fails
//! internally must swallow the failure rather than affect the decision path.

use serde::{Deserialize, Serialize};

/// "A prediction/decision of kind X took Y ms and succeeded/failed"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub kind: String,
    pub duration_ms: f64,
    pub success: bool,
}

impl MetricsEvent {
    pub fn new(kind: impl Into<String>, duration_ms: f64, success: bool) -> Self {
        Self {
            kind: kind.into(),
            duration_ms,
            success,
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _event: MetricsEvent) {}
}
