// Numan Thabit 2025
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::Metrics;

/// Host status. Ordering is ascending health so a descending sort puts
/// Green hosts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not yet classified.
    Grey,
    Red,
    Yellow,
    Green,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Grey => "grey",
            Status::Red => "red",
            Status::Yellow => "yellow",
            Status::Green => "green",
        }
    }

    /// Gauge encoding for self-telemetry.
    pub fn as_gauge(&self) -> i64 {
        match self {
            Status::Grey => -1,
            Status::Red => 0,
            Status::Yellow => 1,
            Status::Green => 2,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lag tolerances against the reference host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthThresholds {
    #[serde(default = "default_transactions_lag")]
    pub transactions_lag: u64,
    #[serde(default = "default_checkpoints_lag")]
    pub checkpoints_lag: u64,
    #[serde(default = "default_tps_lag")]
    pub tps_lag: u64,
    /// Sync percentage at or above which lag checks are waived.
    #[serde(default = "default_sync_high_water")]
    pub sync_high_water: u8,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            transactions_lag: default_transactions_lag(),
            checkpoints_lag: default_checkpoints_lag(),
            tps_lag: default_tps_lag(),
            sync_high_water: default_sync_high_water(),
        }
    }
}

fn default_transactions_lag() -> u64 {
    100
}

fn default_checkpoints_lag() -> u64 {
    30
}

fn default_tps_lag() -> u64 {
    5
}

fn default_sync_high_water() -> u8 {
    99
}

/// Classify a host from the current round's values only. Without a reference
/// nothing can confirm the host is in sync, so it is Red. A host that answered
/// nothing this round is Red whatever it reported before.
pub fn classify(
    host: &Metrics,
    reference: Option<&Metrics>,
    thresholds: &HealthThresholds,
) -> Status {
    let missing = |value: Option<u64>| value.unwrap_or(0) == 0;
    if !host.is_updated()
        || host.stale
        || missing(host.transactions())
        || missing(host.checkpoint())
        || host.tx_sync_percentage.unwrap_or(0) == 0
    {
        return Status::Red;
    }
    let Some(reference) = reference else {
        return Status::Red;
    };

    let tx_in_sync = host.tx_sync_percentage.unwrap_or(0) >= thresholds.sync_high_water;
    let checkpoint_in_sync =
        host.checkpoint_sync_percentage.unwrap_or(0) >= thresholds.sync_high_water;

    if !tx_in_sync
        && (lags(
            host.transactions_per_second,
            reference.transactions_per_second,
            thresholds.tps_lag,
        ) || lags(
            host.transactions(),
            reference.transactions(),
            thresholds.transactions_lag,
        ))
    {
        return Status::Yellow;
    }
    if !checkpoint_in_sync
        && lags(
            host.checkpoint(),
            reference.checkpoint(),
            thresholds.checkpoints_lag,
        )
    {
        return Status::Yellow;
    }
    Status::Green
}

/// True when both values are known and `host` trails `reference` by more than
/// `tolerance`.
fn lags(host: Option<u64>, reference: Option<u64>, tolerance: u64) -> bool {
    match (host, reference) {
        (Some(host), Some(reference)) => reference.saturating_sub(host) > tolerance,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn metrics(transactions: u64, checkpoint: u64) -> Metrics {
        let mut metrics = Metrics::new(10, Duration::from_secs(1));
        metrics.set_total_transactions(transactions);
        metrics.set_latest_checkpoint(checkpoint);
        metrics
    }

    fn reference() -> Metrics {
        let mut reference = metrics(10_000, 500);
        reference.tx_sync_percentage = Some(100);
        reference.checkpoint_sync_percentage = Some(100);
        reference
    }

    fn target(tx_sync: u8) -> Metrics {
        let mut target = metrics(9_850, 490);
        target.tx_sync_percentage = Some(tx_sync);
        target.checkpoint_sync_percentage = Some(98);
        target
    }

    #[test]
    fn lagging_transactions_are_yellow() {
        let status = classify(&target(85), Some(&reference()), &HealthThresholds::default());
        assert_eq!(status, Status::Yellow);
    }

    #[test]
    fn high_sync_percentage_overrides_lag() {
        let status = classify(&target(99), Some(&reference()), &HealthThresholds::default());
        assert_eq!(status, Status::Green);
    }

    #[test]
    fn never_updated_is_red() {
        let host = Metrics::new(10, Duration::from_secs(1));
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Red
        );
        assert_eq!(classify(&host, None, &HealthThresholds::default()), Status::Red);
    }

    #[test]
    fn zero_counters_are_red() {
        let mut host = metrics(0, 490);
        host.tx_sync_percentage = Some(100);
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Red
        );

        let mut host = metrics(9_990, 500);
        host.tx_sync_percentage = Some(0);
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Red
        );
    }

    #[test]
    fn lagging_checkpoints_are_yellow_unless_checkpoint_sync_is_high() {
        let mut host = metrics(10_000, 400);
        host.tx_sync_percentage = Some(100);
        host.checkpoint_sync_percentage = Some(80);
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Yellow
        );
        host.checkpoint_sync_percentage = Some(99);
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Green
        );
    }

    #[test]
    fn slow_throughput_is_yellow() {
        let mut reference = reference();
        reference.transactions_per_second = Some(50);
        let mut host = metrics(9_990, 499);
        host.tx_sync_percentage = Some(98);
        host.checkpoint_sync_percentage = Some(99);
        host.transactions_per_second = Some(40);
        assert_eq!(
            classify(&host, Some(&reference), &HealthThresholds::default()),
            Status::Yellow
        );
        host.transactions_per_second = Some(46);
        assert_eq!(
            classify(&host, Some(&reference), &HealthThresholds::default()),
            Status::Green
        );
    }

    #[test]
    fn stale_host_is_red_despite_good_values() {
        let mut host = target(99);
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Green
        );
        host.mark_stale();
        assert_eq!(
            classify(&host, Some(&reference()), &HealthThresholds::default()),
            Status::Red
        );
    }

    #[test]
    fn missing_reference_is_red() {
        assert_eq!(
            classify(&target(99), None, &HealthThresholds::default()),
            Status::Red
        );
    }

    #[test]
    fn thresholds_are_tunable() {
        let thresholds = HealthThresholds {
            transactions_lag: 200,
            ..HealthThresholds::default()
        };
        assert_eq!(
            classify(&target(85), Some(&reference()), &thresholds),
            Status::Green
        );
    }

    #[test]
    fn classification_is_repeatable() {
        let host = target(85);
        let reference = reference();
        let thresholds = HealthThresholds::default();
        let first = classify(&host, Some(&reference), &thresholds);
        let second = classify(&host, Some(&reference), &thresholds);
        assert_eq!(first, second);
    }

    #[test]
    fn status_orders_green_highest() {
        let mut statuses = vec![Status::Red, Status::Green, Status::Grey, Status::Yellow];
        statuses.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            statuses,
            vec![Status::Green, Status::Yellow, Status::Red, Status::Grey]
        );
    }
}
