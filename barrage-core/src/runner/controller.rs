use std::time::Duration;

use super::schedule::RampingSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RampState {
    Ramping,
    Finished,
}

/// What the executor has to do after one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconcile {
    pub tick: u64,
    /// Logical time of this tick, clamped to the schedule's end.
    pub elapsed: Duration,
    pub target: u64,
    pub spawn: u64,
    pub retire: u64,
    /// The last stage has ended; no further ticks change anything.
    pub done: bool,
}

/// Drives a [`RampingSchedule`] on a logical clock.
///
/// Tick `n` stands for `n * tick_interval` since the start of the run, so the
/// outcome depends only on the number of ticks, never on wall time.
#[derive(Debug, Clone)]
pub struct RampController {
    schedule: RampingSchedule,
    tick_interval: Duration,
    next_tick: u64,
    current: u64,
    stage: Option<usize>,
    state: RampState,
}

impl RampController {
    pub fn new(schedule: RampingSchedule, tick_interval: Duration) -> Self {
        Self {
            schedule,
            tick_interval,
            next_tick: 0,
            current: 0,
            stage: None,
            state: RampState::Ramping,
        }
    }

    pub fn schedule(&self) -> &RampingSchedule {
        &self.schedule
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    /// Target applied by the last tick.
    pub fn current(&self) -> u64 {
        self.current
    }

    fn logical_time(&self, tick: u64) -> Duration {
        let nanos = self.tick_interval.as_nanos().saturating_mul(u128::from(tick));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            .min(self.schedule.total_duration())
    }

    pub fn tick(&mut self) -> Reconcile {
        let tick = self.next_tick;
        self.next_tick += 1;
        let elapsed = self.logical_time(tick);

        if self.state == RampState::Finished {
            return Reconcile {
                tick,
                elapsed,
                target: self.current,
                spawn: 0,
                retire: 0,
                done: true,
            };
        }

        let target = self.schedule.target_at(elapsed);
        let spawn = target.saturating_sub(self.current);
        let retire = self.current.saturating_sub(target);
        self.current = target;

        if let Some(snap) = self.schedule.stage_snapshot_at(elapsed)
            && self.stage != Some(snap.index)
        {
            self.stage = Some(snap.index);
            tracing::info!(
                stage = snap.index + 1,
                stages = snap.count,
                target = snap.end_target,
                "entering stage"
            );
        }

        let done = self.schedule.is_done(elapsed);
        if done {
            self.state = RampState::Finished;
        }

        Reconcile {
            tick,
            elapsed,
            target,
            spawn,
            retire,
            done,
        }
    }
}
