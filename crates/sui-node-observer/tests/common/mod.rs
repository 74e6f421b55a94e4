// Numan Thabit 2025
#![allow(dead_code)]

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sui_node_observer::{
    address::AddressResolver, config::ObserverConfig, metrics::ObserverMetrics,
    poller::HostPoller, Controller,
};
use tokio::net::TcpListener;

/// Minimal Sui node: JSON-RPC on `/` and a Prometheus exposition on
/// `/metrics`, both from the same port.
pub struct MockNode {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

struct MockState {
    transactions: AtomicU64,
    checkpoint: AtomicU64,
    delay_ms: AtomicU64,
    rpc_calls: AtomicUsize,
    scrapes: AtomicUsize,
}

impl MockNode {
    pub async fn start(transactions: u64, checkpoint: u64) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState {
            transactions: AtomicU64::new(transactions),
            checkpoint: AtomicU64::new(checkpoint),
            delay_ms: AtomicU64::new(0),
            rpc_calls: AtomicUsize::new(0),
            scrapes: AtomicUsize::new(0),
        });
        let router = Router::new()
            .route("/", post(rpc))
            .route("/metrics", get(metrics))
            .with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, state })
    }

    pub fn set_counters(&self, transactions: u64, checkpoint: u64) {
        self.state.transactions.store(transactions, Ordering::SeqCst);
        self.state.checkpoint.store(checkpoint, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn rpc_calls(&self) -> usize {
        self.state.rpc_calls.load(Ordering::SeqCst)
    }

    pub fn scrapes(&self) -> usize {
        self.state.scrapes.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

async fn pause(state: &MockState) {
    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

async fn rpc(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Json<Value> {
    state.rpc_calls.fetch_add(1, Ordering::SeqCst);
    pause(&state).await;
    let result = match body["method"].as_str().unwrap_or_default() {
        "sui_getTotalTransactionBlocks" => {
            json!(state.transactions.load(Ordering::SeqCst).to_string())
        }
        "sui_getLatestCheckpointSequenceNumber" => {
            json!(state.checkpoint.load(Ordering::SeqCst).to_string())
        }
        "suix_getLatestSuiSystemState" => json!({
            "epoch": "412",
            "protocolVersion": "68",
            "referenceGasPrice": "750",
            "totalStake": "8123456789000000000",
            "epochStartTimestampMs": "1700000000000",
            "epochDurationMs": "86400000",
            "activeValidators": [
                { "suiAddress": "0x1", "name": "alpha", "gasPrice": "700" },
                { "suiAddress": "0x2", "name": "beta", "gasPrice": "800" }
            ]
        }),
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": format!("Method not found: {other}") }
            }))
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

async fn metrics(State(state): State<Arc<MockState>>) -> String {
    state.scrapes.fetch_add(1, Ordering::SeqCst);
    pause(&state).await;
    let transactions = state.transactions.load(Ordering::SeqCst);
    let checkpoint = state.checkpoint.load(Ordering::SeqCst);
    format!(
        "# HELP highest_known_checkpoint Highest known checkpoint\n\
         # TYPE highest_known_checkpoint gauge\n\
         highest_known_checkpoint {known}\n\
         highest_synced_checkpoint {synced}\n\
         last_executed_checkpoint {checkpoint}\n\
         total_transaction_certificates {transactions}\n\
         number_of_peers 12\n\
         uptime{{chain_identifier=\"35834a8a\",version=\"1.24.1-8d5b1ab3c2\"}} 3600\n",
        known = checkpoint + 5,
        synced = checkpoint + 2,
    )
}

pub fn config(extra: &str) -> Result<ObserverConfig> {
    ObserverConfig::from_toml_str(&format!("refresh_interval = 1\n{extra}"))
}

pub fn node_entries(nodes: &[&MockNode]) -> String {
    nodes
        .iter()
        .map(|node| {
            format!(
                "[[full_nodes]]\njson_rpc_address = \"{0}\"\nmetrics_address = \"{0}\"\n",
                node.address()
            )
        })
        .collect()
}

pub fn controller(config: ObserverConfig) -> Result<(Controller, ObserverMetrics)> {
    let config = Arc::new(config);
    let metrics = ObserverMetrics::new()?;
    let resolver = AddressResolver::with_public_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let poller = HostPoller::new(&config, metrics.clone(), None)?;
    Ok((
        Controller::new(config, resolver, poller, metrics.clone()),
        metrics,
    ))
}
