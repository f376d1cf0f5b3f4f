use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use barrage_core::metrics::MetricValue;
use barrage_core::runner::{ProgressFn, RunEnd, RunPlan, RunSummary};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config_path: &Path, _plan: &RunPlan, _target: &str) {}

    // stdout carries exactly one summary object.
    fn progress(&self) -> Option<ProgressFn> {
        None
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub duration_secs: f64,
    pub end: JsonRunEnd<'a>,
    pub vus_max: u64,
    pub thresholds_passed: bool,
    pub checks: Vec<JsonCheck<'a>>,
    pub metrics: BTreeMap<&'a str, JsonMetric>,
    pub thresholds: Vec<JsonThreshold<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum JsonRunEnd<'a> {
    Completed,
    Interrupted,
    ThresholdAbort {
        metric: &'a str,
        expression: &'a str,
        observed: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck<'a> {
    pub name: &'a str,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonMetric {
    Counter {
        count: f64,
        rate: f64,
    },
    Gauge {
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Rate {
        rate: Option<f64>,
        passes: u64,
        fails: u64,
    },
    Trend {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        #[serde(rename = "p(90)")]
        p90: Option<f64>,
        #[serde(rename = "p(95)")]
        p95: Option<f64>,
        #[serde(rename = "p(99)")]
        p99: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold<'a> {
    pub metric: &'a str,
    pub expression: &'a str,
    pub passed: bool,
    pub no_data: bool,
    pub observed: Option<f64>,
}

pub(crate) fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine<'_> {
    let secs = summary.duration.as_secs_f64().max(1e-9);

    let end = match &summary.end {
        RunEnd::Completed => JsonRunEnd::Completed,
        RunEnd::Interrupted => JsonRunEnd::Interrupted,
        RunEnd::ThresholdAbort(v) => JsonRunEnd::ThresholdAbort {
            metric: &v.metric,
            expression: &v.expression,
            observed: v.observed,
        },
    };

    let metrics = summary
        .metrics
        .iter()
        .map(|m| {
            let v = match &m.values {
                MetricValue::Counter { total } => JsonMetric::Counter {
                    count: *total,
                    rate: total / secs,
                },
                MetricValue::Gauge { value, min, max } => JsonMetric::Gauge {
                    value: *value,
                    min: *min,
                    max: *max,
                },
                MetricValue::Rate { total, trues, rate } => JsonMetric::Rate {
                    rate: *rate,
                    passes: *trues,
                    fails: total.saturating_sub(*trues),
                },
                MetricValue::Trend(t) => JsonMetric::Trend {
                    count: t.count,
                    avg: t.avg,
                    min: t.min,
                    med: t.med,
                    max: t.max,
                    p90: t.p90,
                    p95: t.p95,
                    p99: t.p99,
                },
            };
            (m.name.as_str(), v)
        })
        .collect();

    JsonSummaryLine {
        kind: "summary",
        scenario: &summary.scenario,
        duration_secs: summary.duration.as_secs_f64(),
        end,
        vus_max: summary.vus_max,
        thresholds_passed: summary.thresholds_passed(),
        checks: summary
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: &c.name,
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        metrics,
        thresholds: summary
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: &t.metric,
                expression: &t.expression,
                passed: t.passed,
                no_data: t.no_data,
                observed: t.observed,
            })
            .collect(),
    }
}
