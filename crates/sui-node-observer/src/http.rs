// Numan Thabit 2025
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    address::Group,
    host::Cell,
    metrics::ObserverMetrics,
    state::{GroupSnapshot, SnapshotBoard},
};

#[derive(Clone)]
struct AppState {
    metrics: ObserverMetrics,
    board: SnapshotBoard,
}

#[derive(Serialize)]
struct HostCells {
    address: String,
    cells: Vec<Cell>,
}

pub fn router(metrics: ObserverMetrics, board: SnapshotBoard) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/hosts", get(hosts_handler))
        .route("/hosts/:group", get(group_handler))
        .route("/hosts/:group/cells", get(cells_handler))
        .route("/healthz", get(health_handler))
        .with_state(AppState { metrics, board })
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    bind: SocketAddr,
    metrics: ObserverMetrics,
    board: SnapshotBoard,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind http listener on {bind}"))?;
    info!(bind = %bind, "HTTP server listening");
    axum::serve(listener, router(metrics, board))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("shutdown requested; terminating http server");
        })
        .await
        .context("http server failed")?;
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn hosts_handler(State(state): State<AppState>) -> Json<Vec<GroupSnapshot>> {
    Json(state.board.snapshots())
}

async fn group_handler(State(state): State<AppState>, Path(group): Path<String>) -> Response {
    match lookup(&state.board, &group) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(rejection) => rejection,
    }
}

async fn cells_handler(State(state): State<AppState>, Path(group): Path<String>) -> Response {
    match lookup(&state.board, &group) {
        Ok(snapshot) => {
            let rows: Vec<HostCells> = snapshot
                .hosts
                .iter()
                .map(|host| HostCells {
                    address: host.address().to_string(),
                    cells: host.cells(),
                })
                .collect();
            Json(rows).into_response()
        }
        Err(rejection) => rejection,
    }
}

fn lookup(board: &SnapshotBoard, group: &str) -> std::result::Result<GroupSnapshot, Response> {
    let group: Group = group
        .parse()
        .map_err(|err: String| (StatusCode::BAD_REQUEST, err).into_response())?;
    board.get(group).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("no round published for {group} yet"),
        )
            .into_response()
    })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.board.rounds_completed() == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up");
    }
    (StatusCode::OK, "ok")
}
