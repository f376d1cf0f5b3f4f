use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

mod format;
mod progress;
mod summary;

use barrage_core::runner::{LoadShape, ProgressFn, ProgressUpdate, RunPlan, RunSummary};
use format::{format_duration, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config_path: &std::path::Path, plan: &RunPlan, target: &str) {
        println!("config: {}", config_path.display());
        match &plan.shape {
            LoadShape::ConstantVus { vus, duration } => println!(
                "scenario: {} executor=constant-vus vus={vus} duration={}",
                plan.scenario,
                format_duration(*duration)
            ),
            LoadShape::RampingVus { start_vus, stages } => println!(
                "scenario: {} executor=ramping-vus start_vus={start_vus} stages={} duration={}",
                plan.scenario,
                stages.len(),
                format_duration(plan.total_duration())
            ),
        }
        println!("target: {target}");
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        let prev: Mutex<Option<(Duration, u64)>> = Mutex::new(None);

        Some(Arc::new(move |u| {
            let rps = {
                let mut prev = prev.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let rps = match *prev {
                    Some((at, reqs)) if u.elapsed > at => {
                        let dt = (u.elapsed - at).as_secs_f64().max(1e-9);
                        (u.requests_total.saturating_sub(reqs) as f64) / dt
                    }
                    _ => 0.0,
                };
                *prev = Some((u.elapsed, u.requests_total));
                rps
            };

            progress.update(&u.scenario, u.total_duration, u.elapsed, progress_message(&u, rps));
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));
        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate, rps: f64) -> String {
    let errors = u
        .failed_requests_total
        .saturating_add(u.checks_failed_total);
    let rates = format!(
        " vus={}/{} iters={} rps={} errors={errors}",
        u.active_vus,
        u.target_vus,
        u.iterations_total,
        format_rate(rps)
    );

    match &u.stage {
        Some(stage) => format!(
            "stage={}/{} target={} elapsed={} stage_remaining={}{}",
            stage.stage,
            stage.stages,
            stage.current_target,
            format_duration(u.elapsed),
            format_duration(stage.stage_remaining),
            rates
        ),
        None => format!("elapsed={}{}", format_duration(u.elapsed), rates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrage_core::runner::StageProgress;

    #[test]
    fn message_includes_stage_and_rates() {
        let u = ProgressUpdate {
            tick: 12,
            elapsed: Duration::from_secs(12),
            total_duration: Duration::from_secs(45),
            scenario: "devices".to_string(),
            target_vus: 6,
            active_vus: 6,
            stage: Some(StageProgress {
                stage: 2,
                stages: 4,
                stage_elapsed: Duration::from_secs(2),
                stage_remaining: Duration::from_secs(18),
                start_target: 5,
                end_target: 10,
                current_target: 6,
            }),
            requests_total: 100,
            failed_requests_total: 1,
            iterations_total: 100,
            checks_failed_total: 2,
        };

        let msg = progress_message(&u, 50.0);
        assert!(msg.starts_with("stage=2/4 target=6 elapsed=12s stage_remaining=18s"), "{msg}");
        assert!(msg.contains("vus=6/6"), "{msg}");
        assert!(msg.contains("rps=50.0"), "{msg}");
        assert!(msg.contains("errors=3"), "{msg}");
    }
}
