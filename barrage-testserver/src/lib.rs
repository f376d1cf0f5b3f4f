//! In-process HTTP target for exercising the load generator.
//!
//! Serves HTTP/1.1 and cleartext HTTP/2 (prior knowledge) on the same port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_DEVICES: &str = "/iothings/devices/";
pub const PATH_FLAKY: &str = "/flaky";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_HANG: &str = "/hang";
pub const PATH_ECHO: &str = "/echo";

/// `/flaky` answers 500 to every n-th request.
pub const FLAKY_EVERY: u64 = 50;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,
    flaky_seen: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_errors_total(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub devices: String,
    pub flaky: String,
    pub slow: String,
    pub hang: String,
    pub echo: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            devices: format!("{base_url}{PATH_DEVICES}"),
            flaky: format!("{base_url}{PATH_FLAKY}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            hang: format!("{base_url}{PATH_HANG}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            base_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct Device {
    id: u64,
    reference: String,
    application: &'static str,
    active_until: &'static str,
}

#[derive(Debug, Serialize)]
struct DevicePage {
    count: u64,
    next: Option<String>,
    previous: Option<String>,
    results: Vec<Device>,
}

async fn handle_devices(State(stats): State<TestServerStats>) -> Json<DevicePage> {
    stats.inc_requests_total();
    let results: Vec<Device> = (1..=3)
        .map(|id| Device {
            id,
            reference: format!("sensor-{id:03}"),
            application: "counting",
            active_until: "2050-01-01",
        })
        .collect();

    Json(DevicePage {
        count: results.len() as u64,
        next: None,
        previous: None,
        results,
    })
}

async fn handle_flaky(State(stats): State<TestServerStats>) -> impl IntoResponse {
    stats.inc_requests_total();
    let n = stats.flaky_seen.fetch_add(1, Ordering::Relaxed) + 1;
    if n % FLAKY_EVERY == 0 {
        stats.inc_errors_total();
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    } else {
        (StatusCode::OK, "{\"results\":[]}")
    }
}

async fn handle_slow(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    sleep(Duration::from_millis(50)).await;
    "slow"
}

async fn handle_hang(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    sleep(Duration::from_secs(30)).await;
    "finally"
}

async fn handle_echo(State(stats): State<TestServerStats>, body: Bytes) -> (StatusCode, Bytes) {
    stats.inc_requests_total();
    (StatusCode::OK, body)
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_DEVICES, get(handle_devices))
        .route(PATH_FLAKY, get(handle_flaky))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_HANG, get(handle_hang))
        .route(PATH_ECHO, post(handle_echo))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::bind("127.0.0.1:0".parse().map_err(std::io::Error::other)?).await
    }

    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
