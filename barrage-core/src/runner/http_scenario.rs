use std::future::Future;
use std::time::Duration;

use barrage_http::{Error as HttpError, HttpRequest};
use bytes::Bytes;

use super::checks::{Check, CheckResult, evaluate_checks};
use super::error::{Error, Result};
use super::scenario::Scenario;
use super::vu::VuContext;

/// Inclusive range of HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRange {
    pub start: u16,
    pub end: u16,
}

impl StatusRange {
    pub const DEFAULT_EXPECTED: [StatusRange; 1] = [StatusRange {
        start: 200,
        end: 399,
    }];

    pub fn new(start: u16, end: u16) -> Result<Self> {
        if !(100..=599).contains(&start) || !(100..=599).contains(&end) || start > end {
            return Err(Error::InvalidRequest(format!(
                "invalid expected status range {start}-{end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(status: u16) -> Result<Self> {
        Self::new(status, status)
    }

    pub fn contains(&self, status: u16) -> bool {
        (self.start..=self.end).contains(&status)
    }

    pub fn matches_any(ranges: &[StatusRange], status: u16) -> bool {
        ranges.iter().any(|r| r.contains(status))
    }
}

/// The request every iteration sends.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
    /// Value of the `name` tag; defaults to the URL.
    pub name: Option<String>,
    pub expected_statuses: Vec<StatusRange>,
}

impl RequestTemplate {
    pub fn new(method: http::Method, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let parsed =
            url::Url::parse(&url).map_err(|e| Error::InvalidRequest(format!("`{url}`: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest(format!(
                "`{url}`: only http and https are supported"
            )));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidRequest(format!("`{url}`: missing host")));
        }

        Ok(Self {
            method,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
            name: None,
            expected_statuses: StatusRange::DEFAULT_EXPECTED.to_vec(),
        })
    }

    pub fn to_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: self.timeout,
        }
    }
}

/// Config-driven scenario: one request, its checks, then optional think time.
pub struct HttpScenario {
    request: RequestTemplate,
    checks: Vec<Box<dyn Check>>,
    sleep: Option<Duration>,
}

impl HttpScenario {
    pub fn new(request: RequestTemplate) -> Self {
        Self {
            request,
            checks: Vec::new(),
            sleep: None,
        }
    }

    #[must_use]
    pub fn with_check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    #[must_use]
    pub fn with_checks(mut self, checks: Vec<Box<dyn Check>>) -> Self {
        self.checks.extend(checks);
        self
    }

    #[must_use]
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = (!sleep.is_zero()).then_some(sleep);
        self
    }

    pub fn request(&self) -> &RequestTemplate {
        &self.request
    }

    pub fn checks(&self) -> &[Box<dyn Check>] {
        &self.checks
    }
}

impl Scenario for HttpScenario {
    fn iteration(&self, vu: &VuContext) -> impl Future<Output = ()> + Send {
        async move {
            let res = vu
                .http_with(
                    self.request.to_request(),
                    self.request.name.as_deref(),
                    &self.request.expected_statuses,
                )
                .await;

            match &res {
                Ok(r) => vu.record_checks(&evaluate_checks(&self.checks, r)),
                // Interrupted by the hard stop; there is nothing to check.
                Err(HttpError::Cancelled) => return,
                Err(e) => vu.record_checks(&CheckResult::fail_all(&self.checks, &e.to_string())),
            }

            if let Some(d) = self.sleep {
                vu.sleep(d).await;
            }
        }
    }
}
