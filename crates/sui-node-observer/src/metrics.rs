// Numan Thabit 2025
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    Registry, TextEncoder,
};

use crate::{address::Group, health::Status};

static METRICS_ENCODER: Lazy<TextEncoder> = Lazy::new(TextEncoder::new);

/// The observer's own telemetry, served on `/metrics`.
#[derive(Clone)]
pub struct ObserverMetrics {
    registry: Registry,
    fetch_latency: HistogramVec,
    fetch_errors: IntCounterVec,
    host_status: IntGaugeVec,
    stale_hosts: IntGaugeVec,
    round_duration: HistogramVec,
    reference_unavailable: IntCounter,
}

impl ObserverMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("sui_node_observer".into()), None)
            .context("failed to create registry")?;

        let fetch_latency = HistogramVec::new(
            HistogramOpts::new(
                "fetch_latency_seconds",
                "Latency of successful sub-fetches per host and kind",
            )
            .buckets(vec![
                0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0,
            ]),
            &["host", "kind"],
        )
        .context("failed to build fetch latency histogram")?;

        let fetch_errors = IntCounterVec::new(
            opts!(
                "fetch_errors_total",
                "Count of failed or timed out sub-fetches per host and kind"
            ),
            &["host", "kind", "reason"],
        )
        .context("failed to build fetch error counter")?;

        let host_status = IntGaugeVec::new(
            opts!(
                "host_status",
                "Health status per host (-1 grey, 0 red, 1 yellow, 2 green)"
            ),
            &["group", "host"],
        )
        .context("failed to build host status gauge")?;

        let stale_hosts = IntGaugeVec::new(
            opts!(
                "stale_hosts",
                "Hosts that produced no update in the last round per group"
            ),
            &["group"],
        )
        .context("failed to build stale hosts gauge")?;

        let round_duration = HistogramVec::new(
            HistogramOpts::new("round_duration_seconds", "Wall time of a polling round")
                .buckets(vec![0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
            &["group"],
        )
        .context("failed to build round duration histogram")?;

        let reference_unavailable = IntCounter::with_opts(opts!(
            "reference_unavailable_total",
            "Rounds in which the reference RPC host could not be reached"
        ))
        .context("failed to build reference counter")?;

        registry
            .register(Box::new(fetch_latency.clone()))
            .context("register fetch_latency")?;
        registry
            .register(Box::new(fetch_errors.clone()))
            .context("register fetch_errors")?;
        registry
            .register(Box::new(host_status.clone()))
            .context("register host_status")?;
        registry
            .register(Box::new(stale_hosts.clone()))
            .context("register stale_hosts")?;
        registry
            .register(Box::new(round_duration.clone()))
            .context("register round_duration")?;
        registry
            .register(Box::new(reference_unavailable.clone()))
            .context("register reference_unavailable")?;

        Ok(Self {
            registry,
            fetch_latency,
            fetch_errors,
            host_status,
            stale_hosts,
            round_duration,
            reference_unavailable,
        })
    }

    pub fn record_fetch_latency(&self, host: &str, kind: &str, latency: f64) {
        self.fetch_latency
            .with_label_values(&[host, kind])
            .observe(latency);
    }

    pub fn inc_fetch_error(&self, host: &str, kind: &str, reason: &str) {
        self.fetch_errors
            .with_label_values(&[host, kind, reason])
            .inc();
    }

    pub fn set_host_status(&self, group: Group, host: &str, status: Status) {
        self.host_status
            .with_label_values(&[group.as_str(), host])
            .set(status.as_gauge());
    }

    pub fn set_stale_hosts(&self, group: Group, stale: usize) {
        self.stale_hosts
            .with_label_values(&[group.as_str()])
            .set(stale as i64);
    }

    pub fn record_round(&self, group: Group, seconds: f64) {
        self.round_duration
            .with_label_values(&[group.as_str()])
            .observe(seconds);
    }

    pub fn inc_reference_unavailable(&self) {
        self.reference_unavailable.inc();
    }

    pub fn gather(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::with_capacity(8192);
        METRICS_ENCODER
            .encode(&metric_families, &mut buffer)
            .map_err(|e| anyhow::anyhow!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).context("prometheus output not utf8")
    }
}
