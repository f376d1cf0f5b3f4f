use std::time::Duration;

use barrage_http::{Error, HttpClient, HttpClientConfig, HttpRequest};
use barrage_testserver::TestServer;
use bytes::Bytes;

#[tokio::test]
async fn http1_request_reports_protocol_and_timings() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let res = client.get(&server.urls().devices).await?;
    anyhow::ensure!(res.status == 200, "status {}", res.status);
    anyhow::ensure!(res.proto == "HTTP/1.1", "proto {}", res.proto);
    anyhow::ensure!(res.body_utf8().is_some_and(|b| b.contains("results")));
    anyhow::ensure!(res.header("content-type") == Some("application/json"));
    anyhow::ensure!(res.bytes_received > res.body.len() as u64);

    let t = res.timings;
    anyhow::ensure!(t.duration == t.sending + t.waiting + t.receiving);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn prior_knowledge_speaks_h2c() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::new(&HttpClientConfig {
        http2_prior_knowledge: true,
        ..HttpClientConfig::default()
    });

    let res = client.get(&server.urls().devices).await?;
    anyhow::ensure!(res.status == 200);
    anyhow::ensure!(res.proto == "HTTP/2.0", "proto {}", res.proto);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn pooled_connection_skips_connect_phase() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let first = client.get(&server.urls().devices).await?;
    anyhow::ensure!(first.timings.connecting > Duration::ZERO);

    // The connection goes back to the pool asynchronously once the body is read.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client.get(&server.urls().devices).await?;
    anyhow::ensure!(second.timings.connecting == Duration::ZERO);
    anyhow::ensure!(second.timings.looking_up == Duration::ZERO);
    anyhow::ensure!(server.stats().requests_total() == 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn post_body_round_trips_and_counts_send_bytes() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::post(server.urls().echo.clone(), Bytes::from_static(b"ping"))
        .with_header("content-type", "text/plain");
    let res = client.request(req).await?;
    anyhow::ensure!(&res.body[..] == b"ping");
    anyhow::ensure!(res.bytes_sent > 4);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn per_request_timeout_is_enforced() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::get(server.urls().hang.clone()).with_timeout(Duration::from_millis(100));
    match client.request(req).await {
        Err(Error::Timeout(t)) => anyhow::ensure!(t == Duration::from_millis(100)),
        other => anyhow::bail!("expected timeout, got {other:?}"),
    }

    // The hanging handler keeps graceful shutdown waiting; drop aborts instead.
    drop(server);
    Ok(())
}
