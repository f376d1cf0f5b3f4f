use std::time::Duration;

use super::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear VU target over a list of stages.
///
/// Each stage ramps from the previous stage's target (or `start` for the first
/// one) to its own target by the end of its duration. Interpolation uses
/// integer nanoseconds, so every stage boundary yields its target exactly.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampingSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    /// A flat schedule holding `vus` for `duration`.
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self::new(
            vus,
            vec![Stage {
                duration,
                target: vus,
            }],
        )
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Highest target reached anywhere in the schedule.
    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        }
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        (
            stage_start,
            self.cumulative_ends[idx],
            start_target,
            self.stages[idx].target,
        )
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed == Duration::ZERO {
            return self.start;
        }

        if elapsed >= self.total_duration() {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        if stage_duration.is_zero() {
            return end_target;
        }
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_i = start_target as i128;
        let delta = end_target as i128 - start_i;
        let num = stage_elapsed.as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + delta.saturating_mul(num) / den.max(1);
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);

        let idx = if clamped >= total {
            self.stages.len().saturating_sub(1)
        } else {
            self.stage_index(clamped)
        };
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_at(clamped),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn devices_schedule() -> RampingSchedule {
        RampingSchedule::new(
            0,
            vec![
                Stage {
                    duration: secs(10),
                    target: 5,
                },
                Stage {
                    duration: secs(20),
                    target: 10,
                },
                Stage {
                    duration: secs(10),
                    target: 10,
                },
                Stage {
                    duration: secs(5),
                    target: 0,
                },
            ],
        )
    }

    #[test]
    fn every_stage_boundary_hits_its_target_exactly() {
        let s = devices_schedule();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(10)), 5);
        assert_eq!(s.target_at(secs(30)), 10);
        assert_eq!(s.target_at(secs(40)), 10);
        assert_eq!(s.target_at(secs(45)), 0);
        assert_eq!(s.target_at(secs(1000)), 0);
    }

    #[test]
    fn climb_to_35_then_drop_hits_each_boundary() {
        let stages = [(10, 5), (10, 10), (10, 35), (10, 0)];
        let s = RampingSchedule::new(
            0,
            stages
                .iter()
                .map(|&(d, target)| Stage {
                    duration: secs(d),
                    target,
                })
                .collect(),
        );
        assert_eq!(s.target_at(secs(10)), 5);
        assert_eq!(s.target_at(secs(20)), 10);
        assert_eq!(s.target_at(secs(25)), 22);
        assert_eq!(s.target_at(secs(30)), 35);
        assert_eq!(s.target_at(secs(40)), 0);
        assert_eq!(s.max_target(), 35);
    }

    #[test]
    fn generated_sequences_hit_boundaries_and_stay_between_targets() {
        // xorshift64, fixed seed
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move |bound: u64| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state % bound
        };

        for _ in 0..200 {
            let start = next(20);
            let stages: Vec<Stage> = (0..1 + next(6))
                .map(|_| Stage {
                    duration: Duration::from_millis(1 + next(20_000)),
                    target: next(100),
                })
                .collect();
            let s = RampingSchedule::new(start, stages.clone());

            assert_eq!(s.target_at(Duration::ZERO), start);
            let mut at = Duration::ZERO;
            let mut from = start;
            for stage in &stages {
                let mid = at + stage.duration / 2;
                let t = s.target_at(mid);
                assert!(
                    t >= from.min(stage.target) && t <= from.max(stage.target),
                    "{t} outside [{from}, {}] at {mid:?}",
                    stage.target
                );
                at += stage.duration;
                assert_eq!(s.target_at(at), stage.target, "boundary at {at:?}");
                from = stage.target;
            }
            assert_eq!(s.target_at(at + secs(60)), from);
        }
    }

    #[test]
    fn interpolates_linearly_inside_a_stage() {
        let s = devices_schedule();
        assert_eq!(s.target_at(secs(2)), 1);
        assert_eq!(s.target_at(secs(20)), 7);
        assert_eq!(s.target_at(secs(35)), 10);
    }

    #[test]
    fn ramps_are_monotonic() {
        let s = devices_schedule();
        let mut prev = 0;
        for ms in (0..=30_000).step_by(250) {
            let t = s.target_at(Duration::from_millis(ms));
            assert!(t >= prev, "ramp up went backwards at {ms}ms");
            prev = t;
        }
        for ms in (40_000..=45_000).step_by(250) {
            let t = s.target_at(Duration::from_millis(ms));
            assert!(t <= prev, "ramp down went up at {ms}ms");
            prev = t;
        }
    }

    #[test]
    fn start_target_seeds_the_first_stage() {
        let s = RampingSchedule::new(
            4,
            vec![Stage {
                duration: secs(4),
                target: 0,
            }],
        );
        assert_eq!(s.target_at(Duration::ZERO), 4);
        assert_eq!(s.target_at(secs(2)), 2);
        assert_eq!(s.target_at(secs(4)), 0);
        assert_eq!(s.max_target(), 4);
    }

    #[test]
    fn snapshot_reports_stage_position() {
        let s = devices_schedule();
        let snap = s
            .stage_snapshot_at(secs(15))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 4);
        assert_eq!(snap.stage_elapsed, secs(5));
        assert_eq!(snap.stage_remaining, secs(15));
        assert_eq!(snap.start_target, 5);
        assert_eq!(snap.end_target, 10);

        let last = s
            .stage_snapshot_at(secs(99))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(last.index, 3);
        assert_eq!(last.stage_remaining, Duration::ZERO);
    }

    #[test]
    fn constant_schedule_is_flat() {
        let s = RampingSchedule::constant(3, secs(5));
        assert_eq!(s.target_at(Duration::ZERO), 3);
        assert_eq!(s.target_at(secs(2)), 3);
        assert_eq!(s.target_at(secs(5)), 3);
        assert_eq!(s.total_duration(), secs(5));
    }
}
