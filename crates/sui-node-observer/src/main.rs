// Numan Thabit 2025
use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use sui_node_observer::{
    config::ObserverConfig, http, metrics::ObserverMetrics, Controller, Group, SnapshotBoard,
    WatchLoop,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(author, version, about = "Sui node polling and health observer")]
struct Cli {
    /// Path to the observer configuration file
    #[arg(long, default_value = "ops/sui-node-observer.example.toml")]
    config: PathBuf,

    /// Run a single round per group, print the snapshot as JSON and exit
    #[arg(long)]
    once: bool,

    /// Comma-separated groups to poll; overrides the config file
    #[arg(long, value_delimiter = ',')]
    groups: Vec<Group>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = ObserverConfig::load(&cli.config).await?;
    if !cli.groups.is_empty() {
        config.groups = Some(cli.groups);
    }
    let groups = config.enabled_groups();
    let interval = config.refresh_interval();
    let bind = config.http_bind;
    let config = Arc::new(config);

    let metrics = ObserverMetrics::new()?;
    let board = SnapshotBoard::new();
    let controller = Controller::from_config(config, metrics.clone())?;
    let mut watch = WatchLoop::new(controller, board.clone(), groups, interval);
    let cancel = CancellationToken::new();

    if cli.once {
        watch.tick(&cancel).await;
        let snapshot = serde_json::to_string_pretty(&board.snapshots())
            .context("failed to encode snapshot")?;
        println!("{snapshot}");
        return Ok(());
    }

    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown signal received");
                signal.cancel();
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
        }
    });

    let loop_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        watch.run(&loop_cancel).await;
    });

    let served = http::serve(bind, metrics, board, cancel.clone()).await;
    cancel.cancel();
    watcher.await.context("watch loop task failed")?;
    served
}
