// Numan Thabit 2025
mod common;

use std::time::Duration;

use anyhow::Result;
use common::{config, controller, node_entries, MockNode};
use reqwest::StatusCode;
use serde_json::Value;
use sui_node_observer::{http, Group, SnapshotBoard, WatchLoop};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn routes_expose_snapshots_and_telemetry() -> Result<()> {
    let node = MockNode::start(10_000, 500).await?;
    let raw = format!(
        "groups = [\"node\"]\npublic_rpc = [\"{}\"]\n{}",
        node.url(),
        node_entries(&[&node])
    );
    let config = config(&raw)?;
    let groups = config.enabled_groups();
    let (controller, metrics) = controller(config)?;
    let board = SnapshotBoard::new();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let router = http::router(metrics, board.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let health = client.get(format!("{base}/healthz")).send().await?;
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);

    let mut watch = WatchLoop::new(controller, board.clone(), groups, Duration::from_secs(1));
    watch.tick(&CancellationToken::new()).await;

    let health = client.get(format!("{base}/healthz")).send().await?;
    assert_eq!(health.status(), StatusCode::OK);

    let all: Value = client.get(format!("{base}/hosts")).send().await?.json().await?;
    assert_eq!(all.as_array().map(Vec::len), Some(2));
    assert_eq!(all[0]["group"], "rpc");

    let node_group: Value = client
        .get(format!("{base}/hosts/node"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(node_group["hosts"][0]["status"], "green");
    assert_eq!(node_group["hosts"][0]["metrics"]["total_transactions"], 10_000);

    let cells: Value = client
        .get(format!("{base}/hosts/node/cells"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(cells[0]["address"], node.address());
    assert_eq!(cells[0]["cells"][1]["column"], "status");
    assert_eq!(cells[0]["cells"][1]["value"], "green");

    let missing = client.get(format!("{base}/hosts/validator")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let unknown = client.get(format!("{base}/hosts/bogus")).send().await?;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let telemetry = client.get(format!("{base}/metrics")).send().await?.text().await?;
    assert!(telemetry.contains("sui_node_observer_host_status"));
    assert!(telemetry.contains("sui_node_observer_round_duration_seconds"));

    assert!(board.get(Group::Peers).is_none());
    Ok(())
}

#[tokio::test]
async fn serve_stops_on_cancellation() -> Result<()> {
    let metrics = sui_node_observer::metrics::ObserverMetrics::new()?;
    let cancel = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        "127.0.0.1:0".parse()?,
        metrics,
        SnapshotBoard::new(),
        cancel.clone(),
    ));
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), server).await???;
    Ok(())
}
