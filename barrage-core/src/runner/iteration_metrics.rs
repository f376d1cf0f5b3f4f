use std::time::Duration;

use barrage_metrics::{MetricId, MetricKind, Registry};

use super::request_metrics::ms;

pub const ITERATION_METRICS: &[(&str, MetricKind)] = &[
    ("iterations", MetricKind::Counter),
    ("iteration_duration", MetricKind::Trend),
    ("vus", MetricKind::Gauge),
    ("vus_max", MetricKind::Gauge),
    ("checks", MetricKind::Rate),
];

#[derive(Debug, Clone, Copy)]
pub struct IterationMetricIds {
    pub iterations: MetricId,
    /// Milliseconds.
    pub iteration_duration: MetricId,
    pub vus: MetricId,
    pub vus_max: MetricId,
    pub checks: MetricId,
}

impl IterationMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            iterations: metrics.register("iterations", MetricKind::Counter),
            iteration_duration: metrics.register("iteration_duration", MetricKind::Trend),
            vus: metrics.register("vus", MetricKind::Gauge),
            vus_max: metrics.register("vus_max", MetricKind::Gauge),
            checks: metrics.register("checks", MetricKind::Rate),
        }
    }

    pub fn record_iteration(&self, metrics: &Registry, scenario: &str, duration: Duration) {
        let tags = metrics.resolve_tags(&[("scenario", scenario)]);
        metrics.record(self.iterations, tags.clone(), 1.0);
        metrics.record(self.iteration_duration, tags, ms(duration));
    }

    pub fn record_check(&self, metrics: &Registry, scenario: &str, check: &str, passed: bool) {
        let tags = metrics.resolve_tags(&[("scenario", scenario), ("check", check)]);
        metrics.record(self.checks, tags, if passed { 1.0 } else { 0.0 });
    }

    pub fn record_vus(&self, metrics: &Registry, active: u64, peak: u64) {
        let tags = metrics.resolve_tags::<&str, &str>(&[]);
        metrics.record(self.vus, tags.clone(), active as f64);
        metrics.record(self.vus_max, tags, peak as f64);
    }
}
