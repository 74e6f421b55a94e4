// Numan Thabit 2025
//! Per-group round orchestration: resolve, fan out one poller per host, wait
//! for all of them, then derive sync and health against the reference host.

use std::{
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use futures::FutureExt;
use serde::Serialize;
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    address::{AddressResolver, Group},
    config::ObserverConfig,
    error::{ObserverError, Result},
    geo::GeoLocator,
    health::{classify, Status},
    host::Host,
    metrics::ObserverMetrics,
    poller::HostPoller,
    store::Metrics,
};

#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub group: Group,
    pub hosts: usize,
    /// Hosts whose sub-fetches all failed this round.
    pub stale: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Cancellation was observed while waiting on the barrier.
    pub cancelled: bool,
}

impl RoundReport {
    pub fn is_partial_failure(&self) -> bool {
        self.stale > 0
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

pub struct Controller {
    config: Arc<ObserverConfig>,
    resolver: AddressResolver,
    poller: HostPoller,
    metrics: ObserverMetrics,
    groups: BTreeMap<Group, Vec<Host>>,
    reference: Option<String>,
    reference_fresh: bool,
}

impl Controller {
    pub fn new(
        config: Arc<ObserverConfig>,
        resolver: AddressResolver,
        poller: HostPoller,
        metrics: ObserverMetrics,
    ) -> Self {
        Self {
            config,
            resolver,
            poller,
            metrics,
            groups: BTreeMap::new(),
            reference: None,
            reference_fresh: false,
        }
    }

    pub fn from_config(config: Arc<ObserverConfig>, metrics: ObserverMetrics) -> anyhow::Result<Self> {
        let resolver = AddressResolver::new(&config)?;
        let geo = GeoLocator::from_config(&config)?;
        let poller = HostPoller::new(&config, metrics.clone(), geo)?;
        Ok(Self::new(config, resolver, poller, metrics))
    }

    /// Resolve a group's addresses into fresh hosts unless already done.
    pub async fn prepare(&mut self, group: Group) -> Result<()> {
        if self.groups.contains_key(&group) {
            return Ok(());
        }
        let resolved = self.resolver.resolve(group, &self.config).await?;
        let window = self.config.rate_window;
        let interval = self.config.refresh_interval();
        let hosts: Vec<Host> = resolved
            .into_iter()
            .map(|info| Host::new(group, info, window, interval))
            .collect();
        if group.is_reference() {
            self.reference = hosts.first().map(|host| host.address().to_string());
            self.reference_fresh = false;
        }
        tracing::info!(%group, hosts = hosts.len(), "resolved group addresses");
        self.groups.insert(group, hosts);
        Ok(())
    }

    /// One polling round for `group`. Hosts are stored even when the round
    /// ends in `ReferenceUnavailable`.
    pub async fn run_round(
        &mut self,
        group: Group,
        cancel: &CancellationToken,
    ) -> Result<RoundReport> {
        self.prepare(group).await?;
        let started = Instant::now();
        let hosts = self.groups.remove(&group).unwrap_or_default();
        let total = hosts.len();

        let mut tasks = JoinSet::new();
        let mut prior = Vec::with_capacity(total);
        for (index, host) in hosts.into_iter().enumerate() {
            prior.push(host.clone());
            let poller = self.poller.clone();
            tasks.spawn(async move {
                let polled = AssertUnwindSafe(poller.poll(host)).catch_unwind().await;
                (index, polled.ok())
            });
        }

        let mut slots: Vec<Option<(Host, bool)>> = (0..total).map(|_| None).collect();
        let mut cancelled = false;
        while let Some(joined) = tasks.join_next().await {
            if !cancelled && cancel.is_cancelled() {
                tracing::info!(%group, "cancellation observed; draining in-flight fetches");
                cancelled = true;
            }
            match joined {
                Ok((index, Some(polled))) => slots[index] = Some((polled.host, polled.refreshed)),
                Ok((index, None)) => {
                    tracing::warn!(%group, index, "poll task panicked; keeping prior values");
                }
                Err(err) => tracing::warn!(%group, error = %err, "poll task aborted"),
            }
        }

        // Hosts whose task never reported back keep their prior values.
        let mut stale = 0;
        let mut reference_refreshed = false;
        let mut hosts = Vec::with_capacity(total);
        for (slot, prior) in slots.into_iter().zip(prior) {
            let (mut host, refreshed) = slot.unwrap_or((prior, false));
            if !refreshed {
                host.metrics.mark_stale();
                stale += 1;
            }
            if self.reference.as_deref() == Some(host.address()) {
                reference_refreshed = refreshed;
            }
            hosts.push(host);
        }
        if group.is_reference() {
            self.reference_fresh = reference_refreshed;
        }

        let reference = self.reference_for(group, &hosts);
        for host in &mut hosts {
            if let Some(reference) = &reference {
                host.metrics.update_sync(reference);
            }
            host.status = classify(&host.metrics, reference.as_ref(), &self.config.health);
            self.metrics
                .set_host_status(group, host.address(), host.status);
        }
        hosts.sort_by(Host::rank);

        let duration = started.elapsed();
        self.metrics.record_round(group, duration.as_secs_f64());
        self.metrics.set_stale_hosts(group, stale);
        self.groups.insert(group, hosts);

        if reference.is_none() {
            self.metrics.inc_reference_unavailable();
            return Err(ObserverError::ReferenceUnavailable {
                address: self.reference.clone().unwrap_or_default(),
            });
        }

        let report = RoundReport {
            group,
            hosts: total,
            stale,
            duration,
            cancelled,
        };
        if report.is_partial_failure() {
            tracing::warn!(%group, stale, hosts = total, "round finished with stale hosts");
        }
        Ok(report)
    }

    /// Reference metrics for this round. The reference group takes them from
    /// the hosts just polled; other groups use the last reference round.
    fn reference_for(&self, group: Group, polled: &[Host]) -> Option<Metrics> {
        let address = self.reference.as_deref()?;
        if !self.reference_fresh {
            return None;
        }
        let source = if group.is_reference() {
            polled
        } else {
            self.groups.get(&Group::Rpc)?.as_slice()
        };
        source
            .iter()
            .find(|host| host.address() == address)
            .map(|host| host.metrics.clone())
    }

    pub fn hosts(&self, group: Group) -> &[Host] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn reference_available(&self) -> bool {
        self.reference_fresh
    }

    pub fn status_counts(&self, group: Group) -> BTreeMap<Status, usize> {
        let mut counts = BTreeMap::new();
        for host in self.hosts(group) {
            *counts.entry(host.status).or_insert(0) += 1;
        }
        counts
    }
}
