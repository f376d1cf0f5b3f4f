use std::sync::Arc;
use std::time::{Duration, Instant};

use barrage_http::HttpClient;
use barrage_metrics::Registry;
use tokio_util::sync::CancellationToken;

use super::config::RunPlan;
use super::controller::{RampController, Reconcile};
use super::error::Result;
use super::executor::Executor;
use super::iteration_metrics::IterationMetricIds;
use super::progress::{LiveCounters, ProgressFn, ProgressUpdate, StageProgress};
use super::request_metrics::RequestMetricIds;
use super::scenario::Scenario;
use super::summary::{RunEnd, RunSummary};
use super::thresholds::ThresholdEvaluator;

/// State shared by every VU of a run.
#[derive(Debug)]
pub struct RunContext {
    pub scenario: Arc<str>,
    pub metrics: Arc<Registry>,
    pub request_metrics: RequestMetricIds,
    pub iteration_metrics: IterationMetricIds,
    pub client: HttpClient,
    /// Cancels in-flight requests and think time.
    pub hard_stop: CancellationToken,
    pub live: LiveCounters,
}

impl RunContext {
    pub fn new(scenario: impl Into<Arc<str>>, client: HttpClient) -> Self {
        let metrics = Arc::new(Registry::new());
        Self {
            scenario: scenario.into(),
            request_metrics: RequestMetricIds::register(&metrics),
            iteration_metrics: IterationMetricIds::register(&metrics),
            metrics,
            client,
            hard_stop: CancellationToken::new(),
            live: LiveCounters::default(),
        }
    }
}

/// Runs `scenario` under `plan` until the schedule ends, `stop` fires, or an
/// `abort_on_fail` threshold fails. The summary is built after every VU has
/// been joined.
pub async fn run<S: Scenario>(
    plan: RunPlan,
    scenario: S,
    client: HttpClient,
    stop: CancellationToken,
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    let run = Arc::new(RunContext::new(plan.scenario.as_str(), client));
    let mut controller = RampController::new(plan.schedule(), plan.tick);
    let mut executor = Executor::new(Arc::new(scenario), run.clone());
    let mut thresholds = ThresholdEvaluator::new(plan.thresholds.clone());
    let check_aborts = thresholds.has_abort_rules();

    let total_duration = controller.schedule().total_duration();
    let ids = run.iteration_metrics;
    let vus_max = controller.schedule().max_target();

    tracing::info!(
        scenario = %plan.scenario,
        duration = ?total_duration,
        vus_max,
        "starting run"
    );

    let started = Instant::now();
    let mut interval = tokio::time::interval(plan.tick);

    let end = loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                tracing::warn!("stop requested, retiring virtual users");
                break RunEnd::Interrupted;
            }
            _ = interval.tick() => {}
        }

        let r = controller.tick();
        executor.scale_to(r.target);
        ids.record_vus(&run.metrics, executor.active(), vus_max);

        if let Some(progress) = &progress {
            progress(progress_update(&plan, &controller, &run, &r, total_duration));
        }

        if check_aborts && let Some(v) = thresholds.check_abort(&run.metrics, r.elapsed) {
            tracing::warn!(
                metric = %v.metric,
                expression = %v.expression,
                observed = ?v.observed,
                "threshold failed, aborting run"
            );
            break RunEnd::ThresholdAbort(v);
        }

        if r.done {
            break RunEnd::Completed;
        }
    };

    executor.shutdown(plan.graceful_stop).await?;
    ids.record_vus(&run.metrics, 0, vus_max);

    let duration = started.elapsed();
    tracing::info!(duration = ?duration, end = ?end, "run finished");

    Ok(RunSummary {
        scenario: plan.scenario.clone(),
        duration,
        end,
        vus_max: run.live.peak_vus(),
        metrics: run.metrics.summarize(),
        checks: RunSummary::checks_from(&run.metrics, &ids),
        thresholds: thresholds.finish(&run.metrics, duration),
    })
}

fn progress_update(
    plan: &RunPlan,
    controller: &RampController,
    run: &RunContext,
    r: &Reconcile,
    total_duration: Duration,
) -> ProgressUpdate {
    let stage = controller
        .schedule()
        .stage_snapshot_at(r.elapsed)
        .map(|s| StageProgress {
            stage: s.index + 1,
            stages: s.count,
            stage_elapsed: s.stage_elapsed,
            stage_remaining: s.stage_remaining,
            start_target: s.start_target,
            end_target: s.end_target,
            current_target: s.current_target,
        });

    ProgressUpdate {
        tick: r.tick,
        elapsed: r.elapsed,
        total_duration,
        scenario: plan.scenario.clone(),
        target_vus: r.target,
        active_vus: run.live.active_vus(),
        stage,
        requests_total: run.live.requests_total(),
        failed_requests_total: run.live.failed_requests_total(),
        iterations_total: run.live.iterations_total(),
        checks_failed_total: run.live.checks_failed_total(),
    }
}
