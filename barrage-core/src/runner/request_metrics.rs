use std::time::Duration;

use barrage_http::RequestTimings;
use barrage_metrics::{MetricId, MetricKind, Registry};

use super::iteration_metrics::ITERATION_METRICS;

pub const REQUEST_METRICS: &[(&str, MetricKind)] = &[
    ("http_reqs", MetricKind::Counter),
    ("http_req_failed", MetricKind::Rate),
    ("http_req_duration", MetricKind::Trend),
    ("http_req_blocked", MetricKind::Trend),
    ("http_req_looking_up", MetricKind::Trend),
    ("http_req_connecting", MetricKind::Trend),
    ("http_req_tls_handshaking", MetricKind::Trend),
    ("http_req_sending", MetricKind::Trend),
    ("http_req_waiting", MetricKind::Trend),
    ("http_req_receiving", MetricKind::Trend),
    ("data_sent", MetricKind::Counter),
    ("data_received", MetricKind::Counter),
];

/// Kind of a metric the runner records, or `None` for unknown names.
pub fn builtin_metric_kind(name: &str) -> Option<MetricKind> {
    REQUEST_METRICS
        .iter()
        .chain(ITERATION_METRICS)
        .find(|(n, _)| *n == name)
        .map(|(_, k)| *k)
}

#[derive(Debug, Clone, Copy)]
pub struct RequestMetricIds {
    pub http_reqs: MetricId,
    pub http_req_failed: MetricId,
    /// Milliseconds, `sending + waiting + receiving`.
    pub http_req_duration: MetricId,
    pub http_req_blocked: MetricId,
    pub http_req_looking_up: MetricId,
    pub http_req_connecting: MetricId,
    pub http_req_tls_handshaking: MetricId,
    pub http_req_sending: MetricId,
    pub http_req_waiting: MetricId,
    pub http_req_receiving: MetricId,
    pub data_sent: MetricId,
    pub data_received: MetricId,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestSample<'a> {
    pub scenario: &'a str,
    pub method: &'a str,
    /// Request name tag; the URL unless overridden.
    pub name: &'a str,
    /// `0` when no response arrived.
    pub status: u16,
    pub proto: Option<&'a str>,
    /// Status matched `expected_statuses`. Always `false` without a response.
    pub expected: bool,
    /// Wall time of the attempt; replaced by `timings.duration` when present.
    pub elapsed: Duration,
    pub timings: Option<&'a RequestTimings>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error_kind: Option<&'a str>,
}

pub(crate) fn ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

impl RequestMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        let r = |name: &str| {
            let kind = builtin_metric_kind(name).unwrap_or(MetricKind::Trend);
            metrics.register(name, kind)
        };
        Self {
            http_reqs: r("http_reqs"),
            http_req_failed: r("http_req_failed"),
            http_req_duration: r("http_req_duration"),
            http_req_blocked: r("http_req_blocked"),
            http_req_looking_up: r("http_req_looking_up"),
            http_req_connecting: r("http_req_connecting"),
            http_req_tls_handshaking: r("http_req_tls_handshaking"),
            http_req_sending: r("http_req_sending"),
            http_req_waiting: r("http_req_waiting"),
            http_req_receiving: r("http_req_receiving"),
            data_sent: r("data_sent"),
            data_received: r("data_received"),
        }
    }

    /// Records one request attempt. Every call adds exactly one sample to
    /// `http_reqs`, `http_req_duration` and `http_req_failed`.
    pub fn record_request(&self, metrics: &Registry, sample: RequestSample<'_>) {
        let status = sample.status.to_string();
        let expected = if sample.expected { "true" } else { "false" };

        let mut pairs: Vec<(&str, &str)> = vec![
            ("scenario", sample.scenario),
            ("method", sample.method),
            ("name", sample.name),
            ("status", status.as_str()),
            ("expected_response", expected),
        ];
        if let Some(proto) = sample.proto {
            pairs.push(("proto", proto));
        }
        if let Some(kind) = sample.error_kind {
            pairs.push(("error", kind));
        }
        let tags = metrics.resolve_tags(&pairs);

        let duration = sample.timings.map_or(sample.elapsed, |t| t.duration);

        metrics.record(self.http_reqs, tags.clone(), 1.0);
        metrics.record(self.http_req_duration, tags.clone(), ms(duration));
        metrics.record(
            self.http_req_failed,
            tags.clone(),
            if sample.expected { 0.0 } else { 1.0 },
        );

        if let Some(t) = sample.timings {
            for (id, d) in [
                (self.http_req_blocked, t.blocked),
                (self.http_req_looking_up, t.looking_up),
                (self.http_req_connecting, t.connecting),
                (self.http_req_tls_handshaking, t.tls_handshaking),
                (self.http_req_sending, t.sending),
                (self.http_req_waiting, t.waiting),
                (self.http_req_receiving, t.receiving),
            ] {
                metrics.record(id, tags.clone(), ms(d));
            }
        }

        if sample.bytes_sent > 0 {
            metrics.record(self.data_sent, tags.clone(), sample.bytes_sent as f64);
        }
        if sample.bytes_received > 0 {
            metrics.record(self.data_received, tags, sample.bytes_received as f64);
        }
    }
}
