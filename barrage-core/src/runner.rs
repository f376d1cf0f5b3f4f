mod checks;
mod config;
mod controller;
mod error;
mod executor;
mod http_scenario;
mod iteration_metrics;
mod progress;
mod request_metrics;
mod run;
mod scenario;
mod schedule;
mod summary;
mod thresholds;
mod vu;

pub use checks::{
    Check, CheckResult, FnCheck, NamedCheck, Predicate, PredicateFault, evaluate_checks,
};
pub use config::{LoadShape, RunOptions, RunPlan, Stage};
pub use controller::{RampController, RampState, Reconcile};
pub use error::{Error, Result};
pub use executor::{Executor, VuHandle};
pub use http_scenario::{HttpScenario, RequestTemplate, StatusRange};
pub use iteration_metrics::IterationMetricIds;
pub use progress::{LiveCounters, ProgressFn, ProgressUpdate, StageProgress};
pub use request_metrics::{RequestMetricIds, RequestSample, builtin_metric_kind};
pub use run::{RunContext, run};
pub use scenario::Scenario;
pub use schedule::{RampingSchedule, StageSnapshot};
pub use summary::{CheckSummary, RunEnd, RunSummary};
pub use thresholds::{
    MetricSelector, Threshold, ThresholdAgg, ThresholdEvaluator, ThresholdExpr, ThresholdOp,
    ThresholdResult, ThresholdRule, ThresholdSet, ThresholdState, ThresholdViolation,
    parse_threshold_expr,
};
pub use vu::VuContext;
