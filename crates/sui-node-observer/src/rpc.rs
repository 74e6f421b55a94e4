// Numan Thabit 2025
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{de::DeserializeOwned, Deserialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::system::SystemState;

pub const TOTAL_TRANSACTIONS_METHOD: &str = "sui_getTotalTransactionBlocks";
pub const LATEST_CHECKPOINT_METHOD: &str = "sui_getLatestCheckpointSequenceNumber";
pub const SYSTEM_STATE_METHOD: &str = "suix_getLatestSuiSystemState";

static TOTAL_TRANSACTIONS_PAYLOAD: Lazy<Bytes> = Lazy::new(|| payload(TOTAL_TRANSACTIONS_METHOD));
static LATEST_CHECKPOINT_PAYLOAD: Lazy<Bytes> = Lazy::new(|| payload(LATEST_CHECKPOINT_METHOD));
static SYSTEM_STATE_PAYLOAD: Lazy<Bytes> = Lazy::new(|| payload(SYSTEM_STATE_METHOD));

fn payload(method: &str) -> Bytes {
    Bytes::from(format!(
        r#"{{"jsonrpc":"2.0","id":1,"method":"{method}","params":[]}}"#
    ))
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Sui returns 64-bit counters as decimal strings; accept plain numbers too.
#[serde_as]
#[derive(Debug, Deserialize)]
struct Counter(#[serde_as(as = "PickFirst<(DisplayFromStr, _)>")] u64);

#[derive(Clone)]
pub struct RpcClient {
    client: Client,
}

impl RpcClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .tcp_nodelay(true)
            .pool_idle_timeout(Some(Duration::from_secs(10)))
            .pool_max_idle_per_host(2)
            .build()
            .context("failed to construct rpc client")?;
        Ok(Self { client })
    }

    pub async fn total_transactions(&self, urls: &[String]) -> Result<u64> {
        let Counter(total) = self
            .call_with_fallback(urls, &TOTAL_TRANSACTIONS_PAYLOAD)
            .await?;
        Ok(total)
    }

    pub async fn latest_checkpoint(&self, urls: &[String]) -> Result<u64> {
        let Counter(checkpoint) = self
            .call_with_fallback(urls, &LATEST_CHECKPOINT_PAYLOAD)
            .await?;
        Ok(checkpoint)
    }

    pub async fn system_state(&self, urls: &[String]) -> Result<SystemState> {
        self.call_with_fallback(urls, &SYSTEM_STATE_PAYLOAD).await
    }

    /// Try each candidate URL once, in order, returning the first success.
    async fn call_with_fallback<T: DeserializeOwned>(
        &self,
        urls: &[String],
        payload: &Bytes,
    ) -> Result<T> {
        let mut last_err = None;
        for (attempt, url) in urls.iter().enumerate() {
            match self.call(url, payload).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt + 1 < urls.len() {
                        tracing::debug!(%url, error = %err, "rpc call failed; trying fallback scheme");
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no rpc url configured")))
    }

    async fn call<T: DeserializeOwned>(&self, url: &str, payload: &Bytes) -> Result<T> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.clone())
            .send()
            .await
            .context("rpc request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("rpc endpoint returned status {}", response.status());
        }

        let body = response
            .json::<JsonRpcResponse<T>>()
            .await
            .context("failed to decode rpc body")?;
        match (body.result, body.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => {
                anyhow::bail!("rpc error {}: {}", error.code, error.message)
            }
            (None, None) => anyhow::bail!("rpc response carried neither result nor error"),
        }
    }
}
