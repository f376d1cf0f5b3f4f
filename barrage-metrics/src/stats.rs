use crate::MetricKind;
use crate::sample::Sample;

/// Nearest-rank percentile over an ascending slice.
///
/// `rank = ceil(p / 100 * n)`, clamped to `1..=n`. Returns `None` for an empty
/// slice. `p` may be fractional (`p(99.9)`).
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    // Multiply before dividing so integral inputs stay exact.
    let rank = (p * n as f64 / 100.0).ceil() as usize;
    let rank = rank.clamp(1, n);
    sorted.get(rank - 1).copied()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter {
        total: f64,
    },
    Gauge {
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Rate {
        total: u64,
        trues: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

/// Samples of one or more series merged for read-side statistics.
#[derive(Debug, Clone)]
pub struct Aggregate {
    kind: MetricKind,
    sorted: Vec<f64>,
    sum: f64,
    trues: u64,
    last: Option<Sample>,
}

impl Aggregate {
    pub fn empty(kind: MetricKind) -> Self {
        Self {
            kind,
            sorted: Vec::new(),
            sum: 0.0,
            trues: 0,
            last: None,
        }
    }

    pub fn from_samples(kind: MetricKind, samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut agg = Self::empty(kind);
        agg.extend(samples);
        agg.finish();
        agg
    }

    pub(crate) fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        for s in samples {
            self.sum += s.value;
            if s.value != 0.0 {
                self.trues += 1;
            }
            if self.last.is_none_or(|last| s.at >= last.at) {
                self.last = Some(s);
            }
            self.sorted.push(s.value);
        }
    }

    pub(crate) fn finish(&mut self) {
        self.sorted.sort_unstable_by(f64::total_cmp);
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn count(&self) -> u64 {
        self.sorted.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn avg(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.sum / self.sorted.len() as f64)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(&self.sorted, p)
    }

    /// Share of non-zero samples.
    pub fn rate(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.trues as f64 / self.sorted.len() as f64)
    }

    pub fn trues(&self) -> u64 {
        self.trues
    }

    /// Most recent sample by timestamp.
    pub fn last(&self) -> Option<f64> {
        self.last.map(|s| s.value)
    }

    pub fn value(&self) -> MetricValue {
        match self.kind {
            MetricKind::Counter => MetricValue::Counter { total: self.sum },
            MetricKind::Gauge => MetricValue::Gauge {
                value: self.last(),
                min: self.min(),
                max: self.max(),
            },
            MetricKind::Rate => MetricValue::Rate {
                total: self.count(),
                trues: self.trues,
                rate: self.rate(),
            },
            MetricKind::Trend => MetricValue::Trend(TrendSummary {
                count: self.count(),
                min: self.min(),
                max: self.max(),
                avg: self.avg(),
                med: self.med(),
                p90: self.percentile(90.0),
                p95: self.percentile(95.0),
                p99: self.percentile(99.0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn samples(values: impl IntoIterator<Item = f64>) -> Vec<Sample> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Sample {
                value,
                at: Duration::from_millis(i as u64),
            })
            .collect()
    }

    #[test]
    fn p95_of_one_to_hundred_is_95() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 95.0), Some(95.0));
        assert_eq!(percentile(&sorted, 50.0), Some(50.0));
        assert_eq!(percentile(&sorted, 100.0), Some(100.0));
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
    }

    #[test]
    fn percentile_edge_sizes() {
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(percentile(&[7.0], 95.0), Some(7.0));
        assert_eq!(percentile(&[7.0], 1.0), Some(7.0));
        assert_eq!(percentile(&[1.0, 2.0], 50.0), Some(1.0));
        assert_eq!(percentile(&[1.0, 2.0], 50.1), Some(2.0));
    }

    #[test]
    fn fractional_percentile() {
        let sorted: Vec<f64> = (1..=1000).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 99.9), Some(999.0));
    }

    #[test]
    fn trend_aggregate_sorts_unordered_input() {
        let agg = Aggregate::from_samples(MetricKind::Trend, samples([30.0, 10.0, 20.0]));
        assert_eq!(agg.count(), 3);
        assert_eq!(agg.min(), Some(10.0));
        assert_eq!(agg.max(), Some(30.0));
        assert_eq!(agg.avg(), Some(20.0));
        assert_eq!(agg.med(), Some(20.0));
    }

    #[test]
    fn rate_counts_non_zero() {
        let agg = Aggregate::from_samples(MetricKind::Rate, samples([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(agg.rate(), Some(0.5));
        assert_eq!(
            agg.value(),
            MetricValue::Rate {
                total: 4,
                trues: 2,
                rate: Some(0.5)
            }
        );
    }

    #[test]
    fn empty_aggregate_has_no_stats() {
        let agg = Aggregate::empty(MetricKind::Rate);
        assert_eq!(agg.rate(), None);
        assert_eq!(agg.avg(), None);
        assert_eq!(agg.percentile(95.0), None);
    }

    #[test]
    fn gauge_reports_latest_sample() {
        let agg = Aggregate::from_samples(MetricKind::Gauge, samples([3.0, 9.0, 4.0]));
        assert_eq!(
            agg.value(),
            MetricValue::Gauge {
                value: Some(4.0),
                min: Some(3.0),
                max: Some(9.0)
            }
        );
    }
}
