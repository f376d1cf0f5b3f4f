use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running totals kept alongside the sample store so progress reporting never
/// has to aggregate samples.
#[derive(Debug, Default)]
pub struct LiveCounters {
    active_vus: AtomicU64,
    peak_vus: AtomicU64,
    requests_total: AtomicU64,
    failed_requests_total: AtomicU64,
    iterations_total: AtomicU64,
    checks_failed_total: AtomicU64,
}

impl LiveCounters {
    pub(crate) fn vu_started(&self) {
        let new_active = self
            .active_vus
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        self.peak_vus.fetch_max(new_active, Ordering::Relaxed);
    }

    pub(crate) fn vu_stopped(&self) {
        self.active_vus.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn request(&self, failed: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_requests_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn iteration(&self) {
        self.iterations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn check(&self, passed: bool) {
        if !passed {
            self.checks_failed_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn peak_vus(&self) -> u64 {
        self.peak_vus.load(Ordering::Relaxed)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_requests_total(&self) -> u64 {
        self.failed_requests_total.load(Ordering::Relaxed)
    }

    pub fn iterations_total(&self) -> u64 {
        self.iterations_total.load(Ordering::Relaxed)
    }

    pub fn checks_failed_total(&self) -> u64 {
        self.checks_failed_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Logical tick counter, starting at 0.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub scenario: String,
    pub target_vus: u64,
    pub active_vus: u64,
    pub stage: Option<StageProgress>,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_survives_ramp_down() {
        let live = LiveCounters::default();
        live.vu_started();
        live.vu_started();
        live.vu_started();
        live.vu_stopped();
        live.vu_stopped();
        assert_eq!(live.active_vus(), 1);
        assert_eq!(live.peak_vus(), 3);
    }
}
