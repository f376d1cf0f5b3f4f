use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::MetricKind;

/// One observation, timestamped relative to the registry's start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub at: Duration,
}

#[derive(Debug)]
pub(crate) struct Series {
    pub(crate) kind: MetricKind,
    pub(crate) samples: Mutex<Vec<Sample>>,
}

impl Series {
    pub(crate) fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            samples: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }
}

/// Write handle for a single series. Cheap to clone; hold one per hot path
/// instead of resolving tags for every sample.
#[derive(Debug, Clone)]
pub struct SeriesHandle {
    pub(crate) series: Arc<Series>,
    pub(crate) epoch: Instant,
}

impl SeriesHandle {
    pub fn kind(&self) -> MetricKind {
        self.series.kind
    }

    #[inline]
    pub fn push(&self, value: f64) {
        let at = self.epoch.elapsed();
        self.series.samples.lock().push(Sample { value, at });
    }

    pub fn len(&self) -> usize {
        self.series.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
