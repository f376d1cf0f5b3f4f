use std::fmt;
use std::time::Duration;

use barrage_metrics::{Aggregate, MetricKind, Registry};

use super::error::{Error, Result};
use super::request_metrics::builtin_metric_kind;

/// One expression on a metric, e.g. `p(95)<500`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub expression: String,
    /// Stop the run as soon as this rule fails.
    pub abort_on_fail: bool,
    /// Grace period before `abort_on_fail` is honoured.
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdRule {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            abort_on_fail: false,
            delay_abort_eval: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    /// Metric name, optionally with a tag selector: `http_req_duration{status:200}`.
    pub metric: String,
    pub rules: Vec<ThresholdRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
}

impl ThresholdOp {
    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            ThresholdOp::Lt => left < right,
            ThresholdOp::Lte => left <= right,
            ThresholdOp::Gt => left > right,
            ThresholdOp::Gte => left >= right,
            ThresholdOp::Eq => left == right,
            ThresholdOp::NotEq => left != right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    /// Share of non-zero samples for rates, per-second throughput for counters.
    Rate,
    /// Last value of a gauge.
    Value,
    P(f64),
}

impl ThresholdAgg {
    fn supports(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, ThresholdAgg::Count | ThresholdAgg::Rate),
            MetricKind::Gauge => matches!(
                self,
                ThresholdAgg::Value | ThresholdAgg::Min | ThresholdAgg::Max
            ),
            MetricKind::Rate => matches!(self, ThresholdAgg::Rate),
            MetricKind::Trend => !matches!(self, ThresholdAgg::Rate | ThresholdAgg::Value),
        }
    }

    fn observe(self, agg: &Aggregate, elapsed: Duration) -> Option<f64> {
        if agg.is_empty() {
            return None;
        }
        match (agg.kind(), self) {
            (MetricKind::Counter, ThresholdAgg::Count) => Some(agg.sum()),
            (MetricKind::Counter, ThresholdAgg::Rate) => {
                let secs = elapsed.as_secs_f64();
                (secs > 0.0).then(|| agg.sum() / secs)
            }
            (MetricKind::Gauge, ThresholdAgg::Value) => agg.last(),
            (MetricKind::Rate, ThresholdAgg::Rate) => agg.rate(),
            (_, ThresholdAgg::Avg) => agg.avg(),
            (_, ThresholdAgg::Min) => agg.min(),
            (_, ThresholdAgg::Max) => agg.max(),
            (_, ThresholdAgg::Med) => agg.med(),
            (_, ThresholdAgg::Count) => Some(agg.count() as f64),
            (_, ThresholdAgg::P(p)) => agg.percentile(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::NotEq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| "missing operator".to_string())?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err("expected `<aggregation><operator><value>`".to_string());
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}`"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !p.is_finite() || p <= 0.0 || p > 100.0 {
                return Err(format!("percentile `{inner}` out of range (0, 100]"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid numeric value `{right}`"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Metric name plus optional tag constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

impl MetricSelector {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        let (name, tags) = match raw.split_once('{') {
            None => (raw, Vec::new()),
            Some((name, rest)) => {
                let body = rest
                    .strip_suffix('}')
                    .ok_or_else(|| "unterminated tag selector".to_string())?;
                let mut tags = Vec::new();
                for pair in body.split(',').filter(|p| !p.trim().is_empty()) {
                    let (k, v) = pair
                        .split_once(':')
                        .or_else(|| pair.split_once('='))
                        .ok_or_else(|| format!("expected `tag:value`, got `{}`", pair.trim()))?;
                    let k = k.trim();
                    let v = unquote(v.trim());
                    if k.is_empty() {
                        return Err("empty tag name in selector".to_string());
                    }
                    tags.push((k.to_string(), v.to_string()));
                }
                (name.trim(), tags)
            }
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid metric name `{name}`"));
        }

        Ok(Self {
            name: name.to_string(),
            tags,
        })
    }

    fn aggregate(&self, registry: &Registry, kind: MetricKind) -> Aggregate {
        let Some(id) = registry.lookup(&self.name) else {
            return Aggregate::empty(kind);
        };
        self.tags
            .iter()
            .fold(registry.query(id), |q, (k, v)| q.where_eq(k, v))
            .aggregate()
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(s)
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}:{v}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdState {
    /// No samples seen yet.
    Pending,
    Passing,
    Failing,
}

#[derive(Debug, Clone)]
pub struct Threshold {
    pub selector: MetricSelector,
    pub kind: MetricKind,
    pub expression: String,
    pub expr: ThresholdExpr,
    pub abort_on_fail: bool,
    pub delay_abort_eval: Duration,
    pub state: ThresholdState,
    pub observed: Option<f64>,
}

impl Threshold {
    pub fn parse_sets(sets: &[ThresholdSet]) -> Result<Vec<Threshold>> {
        let mut out = Vec::new();
        for set in sets {
            let invalid = |expression: &str, reason: String| Error::InvalidThreshold {
                metric: set.metric.clone(),
                expression: expression.to_string(),
                reason,
            };

            let selector = MetricSelector::parse(&set.metric).map_err(|e| invalid("", e))?;
            let kind = builtin_metric_kind(&selector.name)
                .ok_or_else(|| Error::UnknownMetric(selector.name.clone()))?;

            for rule in &set.rules {
                let expr = parse_threshold_expr(&rule.expression)
                    .map_err(|e| invalid(&rule.expression, e))?;
                if !expr.agg.supports(kind) {
                    return Err(invalid(
                        &rule.expression,
                        format!("aggregation not available on a {kind} metric"),
                    ));
                }
                out.push(Threshold {
                    selector: selector.clone(),
                    kind,
                    expression: rule.expression.clone(),
                    expr,
                    abort_on_fail: rule.abort_on_fail,
                    delay_abort_eval: rule.delay_abort_eval.unwrap_or(Duration::ZERO),
                    state: ThresholdState::Pending,
                    observed: None,
                });
            }
        }
        Ok(out)
    }

    /// Re-reads the metric and updates `state`.
    pub fn evaluate(&mut self, registry: &Registry, elapsed: Duration) -> ThresholdState {
        let agg = self.selector.aggregate(registry, self.kind);
        self.observed = self.expr.agg.observe(&agg, elapsed);
        self.state = match self.observed {
            None => ThresholdState::Pending,
            Some(v) if self.expr.op.holds(v, self.expr.value) => ThresholdState::Passing,
            Some(_) => ThresholdState::Failing,
        };
        self.state
    }

    fn violation(&self) -> ThresholdViolation {
        ThresholdViolation {
            metric: self.selector.to_string(),
            expression: self.expression.clone(),
            observed: self.observed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
}

/// Final verdict for one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub passed: bool,
    /// Passed only because the metric never received a sample.
    pub no_data: bool,
    pub observed: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    thresholds: Vec<Threshold>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn has_abort_rules(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_fail)
    }

    /// Evaluates `abort_on_fail` rules whose delay has passed and returns the
    /// first one that fails.
    pub fn check_abort(
        &mut self,
        registry: &Registry,
        elapsed: Duration,
    ) -> Option<ThresholdViolation> {
        for t in self
            .thresholds
            .iter_mut()
            .filter(|t| t.abort_on_fail && elapsed >= t.delay_abort_eval)
        {
            if t.evaluate(registry, elapsed) == ThresholdState::Failing {
                return Some(t.violation());
            }
        }
        None
    }

    /// Final evaluation. Rules still `Pending` pass with `no_data` set.
    pub fn finish(mut self, registry: &Registry, elapsed: Duration) -> Vec<ThresholdResult> {
        self.thresholds
            .iter_mut()
            .map(|t| {
                let state = t.evaluate(registry, elapsed);
                ThresholdResult {
                    metric: t.selector.to_string(),
                    expression: t.expression.clone(),
                    passed: state != ThresholdState::Failing,
                    no_data: state == ThresholdState::Pending,
                    observed: t.observed,
                }
            })
            .collect()
    }
}
