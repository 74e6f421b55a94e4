// Numan Thabit 2025
use std::{future::Future, time::Duration};

use anyhow::Context;
use futures::future::OptionFuture;
use reqwest::Client;
use tokio::time::{timeout, Instant};

use crate::{
    config::ObserverConfig,
    error::{FetchKind, ObserverError, Result},
    geo::GeoLocator,
    host::Host,
    metrics::ObserverMetrics,
    rpc::RpcClient,
    scrape,
};

/// Result of one polling round for a single host.
#[derive(Debug)]
pub struct Polled {
    pub host: Host,
    /// At least one sub-fetch produced data this round.
    pub refreshed: bool,
    pub failures: Vec<ObserverError>,
}

/// Performs one bounded attempt per sub-fetch against a host. Cheap to clone;
/// every round task owns a copy.
#[derive(Clone)]
pub struct HostPoller {
    rpc: RpcClient,
    scrape_client: Client,
    geo: Option<GeoLocator>,
    metrics: ObserverMetrics,
    rpc_timeout: Duration,
    metrics_timeout: Duration,
    ip_lookup_timeout: Duration,
}

impl HostPoller {
    pub fn new(
        config: &ObserverConfig,
        metrics: ObserverMetrics,
        geo: Option<GeoLocator>,
    ) -> anyhow::Result<Self> {
        let scrape_client = Client::builder()
            .timeout(config.metrics_timeout())
            .pool_idle_timeout(Some(Duration::from_secs(10)))
            .pool_max_idle_per_host(2)
            .build()
            .context("failed to construct metrics client")?;
        Ok(Self {
            rpc: RpcClient::new(config.rpc_timeout())?,
            scrape_client,
            geo,
            metrics,
            rpc_timeout: config.rpc_timeout(),
            metrics_timeout: config.metrics_timeout(),
            ip_lookup_timeout: config.ip_lookup_timeout(),
        })
    }

    /// Run every applicable sub-fetch concurrently, apply what succeeded and
    /// close out the host's rate windows. Failed sub-fetches leave the prior
    /// values in place.
    pub async fn poll(&self, mut host: Host) -> Polled {
        let address = host.address().to_string();
        let rpc_urls = host.info.rpc_urls();
        let metrics_url = host.info.metrics_url();
        let with_rpc = !rpc_urls.is_empty();
        // The HTTPS fallback gets its own deadline.
        let rpc_budget = self.rpc_timeout * rpc_urls.len().max(1) as u32;

        let totals = OptionFuture::from(with_rpc.then(|| {
            self.bounded(
                &address,
                FetchKind::Rpc,
                rpc_budget,
                self.rpc.total_transactions(&rpc_urls),
            )
        }));
        let checkpoint = OptionFuture::from(with_rpc.then(|| {
            self.bounded(
                &address,
                FetchKind::Rpc,
                rpc_budget,
                self.rpc.latest_checkpoint(&rpc_urls),
            )
        }));
        let system_state = OptionFuture::from((with_rpc && host.group.is_reference()).then(|| {
            self.bounded(
                &address,
                FetchKind::SystemState,
                rpc_budget,
                self.rpc.system_state(&rpc_urls),
            )
        }));
        let scrape = OptionFuture::from(metrics_url.as_deref().map(|url| {
            self.bounded(
                &address,
                FetchKind::Metrics,
                self.metrics_timeout,
                scrape::fetch(&self.scrape_client, url),
            )
        }));
        let ip = host.info.endpoint.ip.filter(|_| host.location.is_none());
        let location = OptionFuture::from(self.geo.as_ref().zip(ip).map(|(geo, ip)| {
            self.bounded(
                &address,
                FetchKind::IpInfo,
                self.ip_lookup_timeout,
                geo.lookup(ip),
            )
        }));

        let (totals, checkpoint, system_state, scrape, location) =
            tokio::join!(totals, checkpoint, system_state, scrape, location);

        let mut failures = Vec::new();
        if let Some(total) = settle(totals, &mut failures) {
            host.metrics.set_total_transactions(total);
        }
        if let Some(checkpoint) = settle(checkpoint, &mut failures) {
            host.metrics.set_latest_checkpoint(checkpoint);
        }
        if let Some(state) = settle(system_state, &mut failures) {
            host.metrics.set_system_state(state);
        }
        if let Some(sample) = settle(scrape, &mut failures) {
            host.metrics.apply_scrape(sample);
        }
        if let Some(info) = settle(location, &mut failures) {
            host.location = Some(info);
        }

        host.metrics.finish_round(&address);
        let refreshed = !host.metrics.stale;
        for failure in &failures {
            tracing::debug!(host = %address, kind = ?failure.kind(), error = %failure, "sub-fetch failed");
        }
        Polled {
            host,
            refreshed,
            failures,
        }
    }

    async fn bounded<T, F>(&self, host: &str, kind: FetchKind, limit: Duration, fetch: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let start = Instant::now();
        match timeout(limit, fetch).await {
            Ok(Ok(value)) => {
                self.metrics
                    .record_fetch_latency(host, kind.as_str(), start.elapsed().as_secs_f64());
                Ok(value)
            }
            Ok(Err(err)) => {
                self.metrics.inc_fetch_error(host, kind.as_str(), "failure");
                Err(ObserverError::FetchFailure {
                    host: host.to_string(),
                    kind,
                    reason: format!("{err:#}"),
                })
            }
            Err(_) => {
                self.metrics.inc_fetch_error(host, kind.as_str(), "timeout");
                Err(ObserverError::FetchTimeout {
                    host: host.to_string(),
                    kind,
                    timeout: limit,
                })
            }
        }
    }
}

fn settle<T>(result: Option<Result<T>>, failures: &mut Vec<ObserverError>) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(err) => {
            failures.push(err);
            None
        }
    }
}
