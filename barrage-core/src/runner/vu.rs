use std::sync::Arc;
use std::time::{Duration, Instant};

use barrage_http::{HttpClient, HttpRequest, HttpResponse};
use barrage_metrics::Registry;
use tokio_util::sync::CancellationToken;

use super::checks::CheckResult;
use super::http_scenario::StatusRange;
use super::request_metrics::RequestSample;
use super::run::RunContext;

/// Per-VU view of the run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct VuContext {
    /// 1-based, unique within a run.
    pub vu_id: u64,
    /// 0-based count of iterations this VU has started.
    pub iteration: u64,
    pub run: Arc<RunContext>,
}

pub(crate) struct ActiveVuGuard {
    run: Arc<RunContext>,
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.run.live.vu_stopped();
    }
}

impl VuContext {
    pub(crate) fn new(vu_id: u64, run: Arc<RunContext>) -> Self {
        Self {
            vu_id,
            iteration: 0,
            run,
        }
    }

    pub fn scenario(&self) -> &str {
        &self.run.scenario
    }

    pub fn client(&self) -> &HttpClient {
        &self.run.client
    }

    pub fn metrics(&self) -> &Registry {
        &self.run.metrics
    }

    /// Fires once the graceful stop window is over.
    pub fn hard_stop(&self) -> &CancellationToken {
        &self.run.hard_stop
    }

    /// Sleeps for `d` unless hard-stopped first. Returns `false` when the
    /// sleep was cut short.
    pub async fn sleep(&self, d: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.run.hard_stop.cancelled() => false,
            () = tokio::time::sleep(d) => true,
        }
    }

    /// Sends `req` and records it, treating 200-399 as expected.
    pub async fn http(&self, req: HttpRequest) -> barrage_http::Result<HttpResponse> {
        self.http_with(req, None, &StatusRange::DEFAULT_EXPECTED)
            .await
    }

    /// Sends `req` and records it under `name` (the URL when `None`).
    /// Statuses outside `expected` count towards `http_req_failed`.
    pub async fn http_with(
        &self,
        req: HttpRequest,
        name: Option<&str>,
        expected: &[StatusRange],
    ) -> barrage_http::Result<HttpResponse> {
        let method = req.method.to_string();
        let url = req.url.clone();

        let started = Instant::now();
        let res = self
            .run
            .client
            .request_until(req, &self.run.hard_stop)
            .await;
        let elapsed = started.elapsed();

        let base = RequestSample {
            scenario: &self.run.scenario,
            method: &method,
            name: name.unwrap_or(url.as_str()),
            status: 0,
            proto: None,
            expected: false,
            elapsed,
            timings: None,
            bytes_sent: 0,
            bytes_received: 0,
            error_kind: None,
        };

        let (sample, failed) = match &res {
            Ok(r) => {
                let ok = StatusRange::matches_any(expected, r.status);
                (
                    RequestSample {
                        status: r.status,
                        proto: Some(r.proto),
                        expected: ok,
                        timings: Some(&r.timings),
                        bytes_sent: r.bytes_sent,
                        bytes_received: r.bytes_received,
                        ..base
                    },
                    !ok,
                )
            }
            Err(e) => {
                tracing::debug!(vu = self.vu_id, error = %e, "request failed");
                (base, true)
            }
        };

        let error_kind = res
            .as_ref()
            .err()
            .map(|e| e.transport_error_kind().to_string());
        self.run.request_metrics.record_request(
            &self.run.metrics,
            RequestSample {
                error_kind: error_kind.as_deref(),
                ..sample
            },
        );
        self.run.live.request(failed);

        res
    }

    pub fn record_checks(&self, results: &[CheckResult]) {
        for r in results {
            self.run.iteration_metrics.record_check(
                &self.run.metrics,
                &self.run.scenario,
                &r.name,
                r.passed,
            );
            self.run.live.check(r.passed);
        }
    }

    pub(crate) fn enter_active_vu(&self) -> ActiveVuGuard {
        self.run.live.vu_started();
        ActiveVuGuard {
            run: self.run.clone(),
        }
    }

    pub(crate) fn record_iteration(&self, duration: Duration) {
        self.run
            .iteration_metrics
            .record_iteration(&self.run.metrics, &self.run.scenario, duration);
        self.run.live.iteration();
    }
}
