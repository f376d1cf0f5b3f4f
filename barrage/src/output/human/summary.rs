use std::fmt::Write as _;

use barrage_core::metrics::{MetricSummary, MetricValue};
use barrage_core::runner::{RunEnd, RunSummary};

use super::format::*;

const BYTE_COUNTERS: &[&str] = &["data_received", "data_sent"];

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(&mut out, "  scenario: {}", summary.scenario).ok();
    match &summary.end {
        RunEnd::Completed => out.push_str("  end: completed\n"),
        RunEnd::Interrupted => out.push_str("  end: interrupted\n"),
        RunEnd::ThresholdAbort(v) => {
            writeln!(
                &mut out,
                "  end: aborted by threshold {}: {}",
                v.metric, v.expression
            )
            .ok();
        }
    }
    writeln!(&mut out, "  duration: {}", format_duration(summary.duration)).ok();
    writeln!(&mut out, "  vus_max: {}", summary.vus_max).ok();

    render_checks(summary, &mut out);
    render_metrics(summary, &mut out);
    render_thresholds(summary, &mut out);

    out
}

fn render_checks(summary: &RunSummary, out: &mut String) {
    if summary.checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in &summary.checks {
        let mark = if c.fails == 0 { '✓' } else { '✗' };
        let rate = if c.total() == 0 {
            0.0
        } else {
            c.passes as f64 / c.total() as f64
        };
        writeln!(
            out,
            "  {mark} {}: {} pass={} fail={}",
            c.name,
            format_percent(rate),
            c.passes,
            c.fails
        )
        .ok();
    }
}

fn render_metrics(summary: &RunSummary, out: &mut String) {
    if summary.metrics.is_empty() {
        return;
    }

    let secs = summary.duration.as_secs_f64().max(1e-9);

    out.push_str("\nmetrics\n");
    for m in &summary.metrics {
        writeln!(out, "  {} = {}", m.name, metric_line(m, secs)).ok();
    }
}

fn metric_line(m: &MetricSummary, secs: f64) -> String {
    match &m.values {
        MetricValue::Counter { total } if BYTE_COUNTERS.contains(&m.name.as_str()) => {
            let total = total.max(0.0).round() as u64;
            format!(
                "{} {}/s",
                format_bytes(total),
                format_bytes(((total as f64) / secs).round() as u64)
            )
        }
        MetricValue::Counter { total } => {
            format!("{total} {}/s", format_rate(total / secs))
        }
        MetricValue::Gauge { value, min, max } => {
            let f = |v: &Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
            format!("{} min={} max={}", f(value), f(min), f(max))
        }
        MetricValue::Rate { total, trues, rate } => format!(
            "{} {trues} out of {total}",
            rate.map_or_else(|| "-".to_string(), format_percent)
        ),
        MetricValue::Trend(t) => format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={} (n={})",
            format_ms_opt(t.avg),
            format_ms_opt(t.min),
            format_ms_opt(t.med),
            format_ms_opt(t.max),
            format_ms_opt(t.p90),
            format_ms_opt(t.p95),
            t.count
        ),
    }
}

fn render_thresholds(summary: &RunSummary, out: &mut String) {
    if summary.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &summary.thresholds {
        let mark = if t.passed { '✓' } else { '✗' };
        let observed = match (t.observed, t.no_data) {
            (_, true) => "no data".to_string(),
            (Some(o), false) => format!("observed {o}"),
            (None, false) => "observed -".to_string(),
        };
        writeln!(out, "  {mark} {}: {} ({observed})", t.metric, t.expression).ok();
    }
}
