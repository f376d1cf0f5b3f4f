use std::time::Duration;

use barrage_metrics::{MetricSummary, Registry};

use super::iteration_metrics::IterationMetricIds;
use super::thresholds::{ThresholdResult, ThresholdViolation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEnd {
    /// The last stage ended.
    Completed,
    /// An external stop was requested.
    Interrupted,
    /// An `abort_on_fail` threshold failed mid-run.
    ThresholdAbort(ThresholdViolation),
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario: String,
    /// Wall time from the first tick until every VU was joined.
    pub duration: Duration,
    pub end: RunEnd,
    pub vus_max: u64,
    pub metrics: Vec<MetricSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdResult>,
}

impl RunSummary {
    pub(crate) fn checks_from(registry: &Registry, ids: &IterationMetricIds) -> Vec<CheckSummary> {
        registry
            .query(ids.checks)
            .aggregate_by("check")
            .into_iter()
            .map(|(name, agg)| CheckSummary {
                name,
                passes: agg.trues(),
                fails: agg.count() - agg.trues(),
            })
            .collect()
    }

    /// Every threshold passed and none aborted the run.
    pub fn thresholds_passed(&self) -> bool {
        !matches!(self.end, RunEnd::ThresholdAbort(_)) && self.thresholds.iter().all(|t| t.passed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    pub fn checks_failed_total(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(end: RunEnd, passed: &[bool]) -> RunSummary {
        RunSummary {
            scenario: "s".to_string(),
            duration: Duration::from_secs(1),
            end,
            vus_max: 1,
            metrics: Vec::new(),
            checks: vec![CheckSummary {
                name: "c".to_string(),
                passes: 3,
                fails: 1,
            }],
            thresholds: passed
                .iter()
                .map(|p| ThresholdResult {
                    metric: "http_req_failed".to_string(),
                    expression: "rate<0.01".to_string(),
                    passed: *p,
                    no_data: false,
                    observed: None,
                })
                .collect(),
        }
    }

    #[test]
    fn verdict_is_the_and_of_all_thresholds() {
        assert!(summary(RunEnd::Completed, &[]).thresholds_passed());
        assert!(summary(RunEnd::Interrupted, &[true, true]).thresholds_passed());
        assert!(!summary(RunEnd::Completed, &[true, false]).thresholds_passed());

        let aborted = RunEnd::ThresholdAbort(ThresholdViolation {
            metric: "checks".to_string(),
            expression: "rate>0.99".to_string(),
            observed: Some(0.5),
        });
        assert!(!summary(aborted, &[true]).thresholds_passed());
    }

    #[test]
    fn counts_failed_checks() {
        let s = summary(RunEnd::Completed, &[]);
        assert_eq!(s.checks_failed_total(), 1);
        assert_eq!(s.checks[0].total(), 4);
    }
}
