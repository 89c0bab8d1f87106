//! `metrics` facade sink
//!
//! Forwards [`MetricsEvent`]s to whatever `metrics` recorder the process
//! installed (the server installs the Prometheus exporter). Without a
//! recorder the calls are no-ops.

use sales_agent_core::{MetricsEvent, MetricsSink};

pub const PREDICTIONS_TOTAL: &str = "sales_agent_predictions_total";
pub const PREDICTION_DURATION_MS: &str = "sales_agent_prediction_duration_ms";

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacadeSink;

impl MetricsSink for MetricsFacadeSink {
    fn record(&self, event: MetricsEvent) {
        let outcome = if event.success { "success" } else { "failure" };
        metrics::counter!(PREDICTIONS_TOTAL, "kind" => event.kind.clone(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!(PREDICTION_DURATION_MS, "kind" => event.kind).record(event.duration_ms);
    }
}
