use anyhow::Context as _;
use std::collections::BTreeMap;

use barrage_core::HttpClient;
use barrage_core::runner::{RunEnd, RunPlan, RunSummary};
use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;
use crate::config_yaml;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let loaded = config_yaml::load_config(&args.config, &env)
        .await
        .map_err(RunError::InvalidInput)?;

    let plan = RunPlan::from_options(loaded.options)?;
    out.print_header(&args.config, &plan, loaded.scenario.request().url.as_str());

    let stop = CancellationToken::new();
    let _stop_listener = stop.clone().drop_guard();
    spawn_signal_handler(stop.clone());

    let client = HttpClient::new(&loaded.http);
    let summary = barrage_core::runner::run(plan, loaded.scenario, client, stop, out.progress())
        .await?;

    out.print_summary(&summary)
        .context("failed to write summary")
        .map_err(RunError::RuntimeError)?;

    print_threshold_violations(&summary);
    Ok(ExitCode::from_thresholds(summary.thresholds_passed()))
}

fn spawn_signal_handler(stop: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            () = stop.cancelled() => {}
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    tracing::warn!("interrupt received, stopping virtual users");
                    stop.cancel();
                }
                Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
            },
        }
    });
}

fn print_threshold_violations(summary: &RunSummary) {
    if let RunEnd::ThresholdAbort(v) = &summary.end {
        match v.observed {
            Some(o) => eprintln!(
                "run_aborted: metric={} expr={} observed={o}",
                v.metric, v.expression
            ),
            None => eprintln!(
                "run_aborted: metric={} expr={} observed=-",
                v.metric, v.expression
            ),
        }
    }

    let failed: Vec<_> = summary.failed_thresholds().collect();
    if failed.is_empty() {
        return;
    }

    eprintln!("thresholds_failed: {}", failed.len());
    for t in failed {
        match t.observed {
            Some(o) => eprintln!(
                "threshold_failed: metric={} expr={} observed={o}",
                t.metric, t.expression
            ),
            None => eprintln!(
                "threshold_failed: metric={} expr={} observed=-",
                t.metric, t.expression
            ),
        }
    }
}

fn merged_env(overrides: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map: BTreeMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_splits_on_first_equals() {
        let (k, v) = parse_env_override("TOKEN=a=b").unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(k, "TOKEN");
        assert_eq!(v, "a=b");

        assert!(parse_env_override("NOVALUE").is_err());
        assert!(parse_env_override("=x").is_err());
    }

    #[test]
    fn overrides_win_over_process_env() {
        let env = merged_env(&["PATH=overridden".to_string(), "BARRAGE_X=1".to_string()])
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("overridden"));
        assert_eq!(env.get("BARRAGE_X").map(String::as_str), Some("1"));
    }
}
