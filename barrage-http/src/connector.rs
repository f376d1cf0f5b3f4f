use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::dns::{GaiAddrs, GaiResolver, Name};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower_service::Service;

use crate::timings::current_phases;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// System resolver that reports lookup time to the calling request.
#[derive(Debug, Clone)]
pub(crate) struct TimedResolver {
    inner: GaiResolver,
}

impl TimedResolver {
    pub(crate) fn new() -> Self {
        Self {
            inner: GaiResolver::new(),
        }
    }
}

impl Service<Name> for TimedResolver {
    type Response = GaiAddrs;
    type Error = std::io::Error;
    type Future = BoxFuture<Result<GaiAddrs, std::io::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, name: Name) -> Self::Future {
        let phases = current_phases();
        let started = Instant::now();
        let fut = self.inner.call(name);

        Box::pin(async move {
            let res = fut.await;
            if let Some(phases) = phases {
                phases.lock().looking_up += started.elapsed();
            }
            res
        })
    }
}

/// TCP dialer. Reports connect time net of DNS.
#[derive(Debug, Clone)]
pub(crate) struct TimedHttpConnector {
    inner: HttpConnector<TimedResolver>,
}

impl TimedHttpConnector {
    pub(crate) fn new(connect_timeout: Option<Duration>) -> Self {
        let mut inner = HttpConnector::new_with_resolver(TimedResolver::new());
        inner.enforce_http(false);
        inner.set_nodelay(true);
        inner.set_connect_timeout(connect_timeout);
        Self { inner }
    }
}

impl Service<http::Uri> for TimedHttpConnector {
    type Response = <HttpConnector<TimedResolver> as Service<http::Uri>>::Response;
    type Error = <HttpConnector<TimedResolver> as Service<http::Uri>>::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: http::Uri) -> Self::Future {
        let phases = current_phases();
        let started = Instant::now();
        let fut = self.inner.call(uri);

        Box::pin(async move {
            let res = fut.await;
            if let Some(phases) = phases {
                let elapsed = started.elapsed();
                let mut p = phases.lock();
                let looking_up = p.looking_up;
                p.connecting += elapsed.saturating_sub(looking_up);
            }
            res
        })
    }
}

/// TLS layer on top of [`TimedHttpConnector`]. Plain `http://` passes through.
#[derive(Debug, Clone)]
pub(crate) struct TimedHttpsConnector {
    inner: HttpsConnector<TimedHttpConnector>,
}

impl TimedHttpsConnector {
    pub(crate) fn new(connect_timeout: Option<Duration>) -> Self {
        let inner = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(TimedHttpConnector::new(connect_timeout));
        Self { inner }
    }
}

impl Service<http::Uri> for TimedHttpsConnector {
    type Response = <HttpsConnector<TimedHttpConnector> as Service<http::Uri>>::Response;
    type Error = <HttpsConnector<TimedHttpConnector> as Service<http::Uri>>::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: http::Uri) -> Self::Future {
        let is_tls = uri.scheme() == Some(&http::uri::Scheme::HTTPS);
        let phases = current_phases();
        let started = Instant::now();
        let fut = self.inner.call(uri);

        Box::pin(async move {
            let res = fut.await;
            if let Some(phases) = phases {
                let elapsed = started.elapsed();
                let mut p = phases.lock();
                if is_tls && res.is_ok() {
                    let dialing = p.looking_up + p.connecting;
                    p.tls_handshaking += elapsed.saturating_sub(dialing);
                }
                p.established_at = Some(Instant::now());
            }
            res
        })
    }
}
