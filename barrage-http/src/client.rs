use http_body_util::BodyExt as _;
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::body::TimedBody;
use super::connector::TimedHttpsConnector;
use super::estimate::{request_bytes, response_head_bytes};
use super::timings::{CONNECT_PHASES, Marks, PhaseCell};
use super::util::{parse_http_url, proto_str};
use super::{Error, HttpRequest, HttpResponse, RequestTimings, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub connect_timeout: Option<Duration>,
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
    /// Speak HTTP/2 without negotiation, including cleartext h2c.
    pub http2_prior_knowledge: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            // The OS-level TCP connect timeout can be tens of seconds, which makes
            // short runs against an unreachable host look hung.
            connect_timeout: Some(Duration::from_secs(3)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: usize::MAX,
            http2_prior_knowledge: false,
        }
    }
}

/// Pooled HTTP/1.1 + HTTP/2 client. Clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<TimedHttpsConnector, TimedBody>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(&HttpClientConfig::default())
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(config: &HttpClientConfig) -> Self {
        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(config.http2_prior_knowledge);

        let inner = builder.build(TimedHttpsConnector::new(config.connect_timeout));
        Self { inner }
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = parse_http_url(&req.url)?;
        let bytes_sent = request_bytes(&req.method, &parsed, &req.headers, req.body.len() as u64);

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);
        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let (body, sent_at) = TimedBody::new(req.body);
        let request: Request<TimedBody> = builder.body(body)?;

        let deadline = req
            .timeout
            .map(|t| (t, tokio::time::Instant::now() + t));
        let phases = PhaseCell::default();

        let started = Instant::now();
        let send = CONNECT_PHASES.scope(phases.clone(), self.inner.request(request));
        let res: hyper::Response<Incoming> = with_deadline(deadline, send).await??;
        let head = Instant::now();

        let (parts, body) = res.into_parts();

        // Lowercase names; repeated headers are joined with ", ".
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let v = String::from_utf8_lossy(value.as_bytes()).to_string();
            merged
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }

        let head_bytes = response_head_bytes(parts.version, parts.status, &parts.headers);
        let body = with_deadline(deadline, body.collect()).await??.to_bytes();
        let done = Instant::now();

        let timings = RequestTimings::from_marks(
            &Marks {
                started,
                sent: sent_at.get().copied(),
                head,
                done,
            },
            &phases.lock(),
        );

        tracing::trace!(
            status = parts.status.as_u16(),
            proto = proto_str(parts.version),
            duration_ms = timings.duration.as_secs_f64() * 1000.0,
            "http response"
        );

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            proto: proto_str(parts.version),
            headers: merged.into_iter().collect(),
            bytes_sent,
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
            timings,
        })
    }

    /// Like [`HttpClient::request`], but gives up with [`Error::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn request_until(
        &self,
        req: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            res = self.request(req) => res,
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

async fn with_deadline<F: Future>(
    deadline: Option<(Duration, tokio::time::Instant)>,
    fut: F,
) -> Result<F::Output> {
    match deadline {
        Some((timeout, at)) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| Error::Timeout(timeout)),
        None => Ok(fut.await),
    }
}
