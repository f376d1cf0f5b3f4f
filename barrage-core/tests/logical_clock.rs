use std::sync::{Arc, Mutex};
use std::time::Duration;

use barrage_core::HttpClient;
use barrage_core::runner::{
    CheckResult, ProgressFn, ProgressUpdate, RunEnd, RunOptions, RunPlan, Stage, ThresholdRule,
    ThresholdSet, VuContext, run,
};
use barrage_metrics::MetricValue;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn failing_abort_threshold_stops_the_run_early() -> anyhow::Result<()> {
    let mut rule = ThresholdRule::new("rate>0.99");
    rule.abort_on_fail = true;
    rule.delay_abort_eval = Some(Duration::from_secs(2));

    let plan = RunPlan::from_options(RunOptions {
        vus: Some(2),
        duration: Some(Duration::from_secs(60)),
        thresholds: vec![ThresholdSet {
            metric: "checks".to_string(),
            rules: vec![rule],
        }],
        ..RunOptions::default()
    })?;

    let scenario = |vu: VuContext| async move {
        vu.record_checks(&[CheckResult {
            name: "every other".to_string(),
            passed: vu.iteration % 2 == 0,
            fault: None,
        }]);
        vu.sleep(Duration::from_millis(100)).await;
    };

    let started = tokio::time::Instant::now();
    let summary = run(
        plan,
        scenario,
        HttpClient::default(),
        CancellationToken::new(),
        None,
    )
    .await?;

    match &summary.end {
        RunEnd::ThresholdAbort(v) => {
            anyhow::ensure!(v.metric == "checks");
            anyhow::ensure!(v.observed.is_some_and(|r| r < 0.99));
        }
        other => anyhow::bail!("expected abort, got {other:?}"),
    }
    anyhow::ensure!(!summary.thresholds_passed());
    anyhow::ensure!(started.elapsed() < Duration::from_secs(10));
    anyhow::ensure!(summary.checks.len() == 1 && summary.checks[0].fails > 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn constant_vus_report_progress_every_tick() -> anyhow::Result<()> {
    let plan = RunPlan::from_options(RunOptions {
        vus: Some(3),
        duration: Some(Duration::from_secs(2)),
        tick: Some(Duration::from_millis(500)),
        thresholds: vec![ThresholdSet {
            metric: "http_req_failed".to_string(),
            rules: vec![ThresholdRule::new("rate<0.01")],
        }],
        ..RunOptions::default()
    })?;

    let seen: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::default();
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |u| {
        sink.lock().unwrap_or_else(|e| e.into_inner()).push(u);
    });

    let scenario = |vu: VuContext| async move {
        vu.sleep(Duration::from_millis(100)).await;
    };
    let summary = run(
        plan,
        scenario,
        HttpClient::default(),
        CancellationToken::new(),
        Some(progress),
    )
    .await?;

    let updates = seen.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let ticks: Vec<u64> = updates.iter().map(|u| u.tick).collect();
    anyhow::ensure!(ticks == vec![0, 1, 2, 3, 4], "ticks {ticks:?}");
    anyhow::ensure!(updates.iter().all(|u| u.target_vus == 3));
    anyhow::ensure!(updates.last().is_some_and(|u| u.elapsed == Duration::from_secs(2)));

    anyhow::ensure!(summary.end == RunEnd::Completed);
    anyhow::ensure!(summary.vus_max == 3);
    match summary.metric("iterations").map(|m| &m.values) {
        Some(MetricValue::Counter { total }) => {
            anyhow::ensure!((57.0..=63.0).contains(total), "iterations {total}")
        }
        other => anyhow::bail!("unexpected {other:?}"),
    }

    // No requests were made, so the error-rate threshold passes without data.
    let t = &summary.thresholds[0];
    anyhow::ensure!(t.passed && t.no_data);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ramp_down_to_zero_retires_everyone() -> anyhow::Result<()> {
    let plan = RunPlan::from_options(RunOptions {
        start_vus: Some(4),
        stages: Some(vec![Stage {
            duration: Duration::from_secs(4),
            target: 0,
        }]),
        ..RunOptions::default()
    })?;

    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::default();
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |u: ProgressUpdate| {
        sink.lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((u.tick, u.target_vus));
    });

    let scenario = |vu: VuContext| async move {
        vu.sleep(Duration::from_millis(250)).await;
    };
    let summary = run(
        plan,
        scenario,
        HttpClient::default(),
        CancellationToken::new(),
        Some(progress),
    )
    .await?;

    let targets = seen.lock().unwrap_or_else(|e| e.into_inner()).clone();
    anyhow::ensure!(
        targets == vec![(0, 4), (1, 3), (2, 2), (3, 1), (4, 0)],
        "targets {targets:?}"
    );
    anyhow::ensure!(summary.vus_max == 4);
    match summary.metric("vus").map(|m| &m.values) {
        Some(MetricValue::Gauge { value, max, .. }) => {
            anyhow::ensure!(*value == Some(0.0) && *max == Some(4.0))
        }
        other => anyhow::bail!("unexpected {other:?}"),
    }
    Ok(())
}
