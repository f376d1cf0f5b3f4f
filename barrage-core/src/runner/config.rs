use std::time::Duration;

use super::error::{Error, Result};
use super::schedule::RampingSchedule;
use super::thresholds::{Threshold, ThresholdSet};

pub const DEFAULT_SCENARIO: &str = "default";
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Load options as written by the user, before validation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub name: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub start_vus: Option<u64>,
    /// `None` selects constant-VUs mode; `Some` must hold at least one stage.
    pub stages: Option<Vec<Stage>>,
    pub thresholds: Vec<ThresholdSet>,
    pub graceful_stop: Option<Duration>,
    pub tick: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadShape {
    ConstantVus { vus: u64, duration: Duration },
    RampingVus { start_vus: u64, stages: Vec<Stage> },
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub scenario: String,
    pub shape: LoadShape,
    pub thresholds: Vec<Threshold>,
    pub graceful_stop: Duration,
    pub tick: Duration,
}

impl RunPlan {
    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let scenario = opts
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());

        let shape = match opts.stages {
            Some(stages) => {
                if stages.is_empty() || stages.iter().any(|s| s.duration.is_zero()) {
                    return Err(Error::InvalidStages);
                }
                if opts.vus.is_some() {
                    tracing::warn!(
                        scenario = %scenario,
                        "`vus` is ignored when `stages` are given"
                    );
                }
                LoadShape::RampingVus {
                    start_vus: opts.start_vus.unwrap_or(0),
                    stages,
                }
            }
            None => {
                let vus = opts.vus.unwrap_or(1);
                if vus == 0 {
                    return Err(Error::InvalidVus);
                }
                let duration = opts.duration.ok_or(Error::MissingDuration)?;
                if duration.is_zero() {
                    return Err(Error::InvalidDuration);
                }
                LoadShape::ConstantVus { vus, duration }
            }
        };

        let tick = opts.tick.unwrap_or(DEFAULT_TICK);
        if tick.is_zero() {
            return Err(Error::InvalidTick);
        }

        let thresholds = Threshold::parse_sets(&opts.thresholds)?;

        Ok(Self {
            scenario,
            shape,
            thresholds,
            graceful_stop: opts.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
            tick,
        })
    }

    pub fn schedule(&self) -> RampingSchedule {
        match &self.shape {
            LoadShape::ConstantVus { vus, duration } => RampingSchedule::constant(*vus, *duration),
            LoadShape::RampingVus { start_vus, stages } => {
                RampingSchedule::new(*start_vus, stages.clone())
            }
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.schedule().total_duration()
    }
}
