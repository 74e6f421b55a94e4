// Numan Thabit 2025
//! Per-host metric record and the derived values computed from it.

use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{scrape::ScrapeSample, system::SystemState};

/// Fixed-capacity window of cumulative counter samples.
#[derive(Debug, Clone)]
pub struct RateWindow {
    samples: VecDeque<u64>,
    capacity: usize,
    interval: Duration,
}

impl RateWindow {
    /// `interval` is the expected spacing between samples (the poll interval).
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            interval,
        }
    }

    /// Append a cumulative sample. Returns the per-second rate once the window
    /// is full, then slides the window by one.
    pub fn push(&mut self, total: u64) -> Option<u64> {
        self.samples.push_back(total);
        if self.samples.len() < self.capacity {
            return None;
        }
        let oldest = self.samples.pop_front()?;
        let newest = *self.samples.back()?;
        let intervals = (self.capacity - 1) as f64;
        let seconds = self.interval.as_secs_f64().max(f64::EPSILON);
        let rate = newest.saturating_sub(oldest) as f64 / intervals / seconds;
        Some(rate.round() as u64)
    }

    /// Drop every sample; the next rate needs a full window again.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Host progress toward the reference value as a floored 0..=100 integer.
pub fn sync_percentage(host: u64, reference: u64) -> u8 {
    if host >= reference {
        return 100;
    }
    ((host as u128 * 100) / reference as u128).min(100) as u8
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub updated: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// No sub-fetch produced data in the last round; every value is carried
    /// over from an earlier round.
    pub stale: bool,

    pub total_transactions: Option<u64>,
    pub latest_checkpoint: Option<u64>,

    pub total_transaction_certificates: Option<u64>,
    pub total_transaction_effects: Option<u64>,
    pub highest_known_checkpoint: Option<u64>,
    pub highest_synced_checkpoint: Option<u64>,
    pub last_executed_checkpoint: Option<u64>,
    pub current_round: Option<u64>,
    pub highest_received_round: Option<u64>,
    pub last_committed_round: Option<u64>,
    pub certificates_created: Option<u64>,
    pub number_of_peers: Option<u64>,
    pub current_epoch: Option<u64>,
    pub epoch_total_duration: Option<u64>,
    pub current_voting_right: Option<f64>,
    pub last_certificate_age: Option<f64>,
    pub uptime_secs: Option<u64>,
    pub version: Option<String>,
    pub commit: Option<String>,

    pub transactions_per_second: Option<u64>,
    pub checkpoints_per_second: Option<u64>,
    pub tx_sync_percentage: Option<u8>,
    pub checkpoint_sync_percentage: Option<u8>,
    pub checkpoint_exec_backlog: Option<u64>,
    pub checkpoint_sync_backlog: Option<u64>,

    pub system_state: Option<SystemState>,

    #[serde(skip)]
    tx_window: RateWindow,
    #[serde(skip)]
    checkpoint_window: RateWindow,
    #[serde(skip)]
    round: RoundFresh,
}

/// What the current round has refreshed so far.
#[derive(Debug, Clone, Copy, Default)]
struct RoundFresh {
    any: bool,
    transactions: bool,
    checkpoint: bool,
}

impl Metrics {
    pub fn new(window: usize, interval: Duration) -> Self {
        Self {
            updated: false,
            last_updated: None,
            stale: false,
            total_transactions: None,
            latest_checkpoint: None,
            total_transaction_certificates: None,
            total_transaction_effects: None,
            highest_known_checkpoint: None,
            highest_synced_checkpoint: None,
            last_executed_checkpoint: None,
            current_round: None,
            highest_received_round: None,
            last_committed_round: None,
            certificates_created: None,
            number_of_peers: None,
            current_epoch: None,
            epoch_total_duration: None,
            current_voting_right: None,
            last_certificate_age: None,
            uptime_secs: None,
            version: None,
            commit: None,
            transactions_per_second: None,
            checkpoints_per_second: None,
            tx_sync_percentage: None,
            checkpoint_sync_percentage: None,
            checkpoint_exec_backlog: None,
            checkpoint_sync_backlog: None,
            system_state: None,
            tx_window: RateWindow::new(window, interval),
            checkpoint_window: RateWindow::new(window, interval),
            round: RoundFresh::default(),
        }
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Transaction count: the RPC total when available, otherwise the
    /// certificate counter scraped from metrics.
    pub fn transactions(&self) -> Option<u64> {
        self.total_transactions
            .or(self.total_transaction_certificates)
    }

    /// Latest checkpoint: the RPC sequence number when available, otherwise
    /// the last executed checkpoint scraped from metrics.
    pub fn checkpoint(&self) -> Option<u64> {
        self.latest_checkpoint.or(self.last_executed_checkpoint)
    }

    pub fn set_total_transactions(&mut self, total: u64) {
        self.total_transactions = Some(total);
        self.round.transactions = true;
        self.mark_updated();
    }

    pub fn set_latest_checkpoint(&mut self, checkpoint: u64) {
        self.latest_checkpoint = Some(checkpoint);
        self.round.checkpoint = true;
        self.mark_updated();
    }

    pub fn set_system_state(&mut self, state: SystemState) {
        self.system_state = Some(state);
        self.mark_updated();
    }

    /// Overwrite the scraped fields present in `sample`; absent fields keep
    /// their prior value.
    pub fn apply_scrape(&mut self, sample: ScrapeSample) {
        fn keep<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        // Scraped counters only feed the rates while no RPC value shadows them.
        if self.total_transactions.is_none() && sample.total_transaction_certificates.is_some() {
            self.round.transactions = true;
        }
        if self.latest_checkpoint.is_none() && sample.last_executed_checkpoint.is_some() {
            self.round.checkpoint = true;
        }
        keep(
            &mut self.total_transaction_certificates,
            sample.total_transaction_certificates,
        );
        keep(
            &mut self.total_transaction_effects,
            sample.total_transaction_effects,
        );
        keep(
            &mut self.highest_known_checkpoint,
            sample.highest_known_checkpoint,
        );
        keep(
            &mut self.highest_synced_checkpoint,
            sample.highest_synced_checkpoint,
        );
        keep(
            &mut self.last_executed_checkpoint,
            sample.last_executed_checkpoint,
        );
        keep(&mut self.current_round, sample.current_round);
        keep(&mut self.highest_received_round, sample.highest_received_round);
        keep(&mut self.last_committed_round, sample.last_committed_round);
        keep(&mut self.certificates_created, sample.certificates_created);
        keep(&mut self.number_of_peers, sample.number_of_peers);
        keep(&mut self.current_epoch, sample.current_epoch);
        keep(&mut self.epoch_total_duration, sample.epoch_total_duration);
        keep(&mut self.current_voting_right, sample.current_voting_right);
        keep(&mut self.last_certificate_age, sample.last_certificate_age);
        keep(&mut self.uptime_secs, sample.uptime_secs);
        keep(&mut self.version, sample.version);
        keep(&mut self.commit, sample.commit);
        self.mark_updated();
    }

    /// Close out a polling round: feed the rate windows with the counters
    /// refreshed this round and recompute backlogs. A counter that missed the
    /// round restarts its window.
    pub fn finish_round(&mut self, host: &str) {
        let round = std::mem::take(&mut self.round);
        self.stale = !round.any;
        match self.transactions().filter(|_| round.transactions) {
            Some(total) => self.transactions_per_second = self.tx_window.push(total),
            None => {
                self.tx_window.clear();
                self.transactions_per_second = None;
            }
        }
        match self.checkpoint().filter(|_| round.checkpoint) {
            Some(checkpoint) => {
                self.checkpoints_per_second = self.checkpoint_window.push(checkpoint)
            }
            None => {
                self.checkpoint_window.clear();
                self.checkpoints_per_second = None;
            }
        }
        if let Some(known) = self.highest_known_checkpoint {
            self.checkpoint_exec_backlog = self
                .last_executed_checkpoint
                .map(|executed| backlog(host, "execution", known, executed));
            self.checkpoint_sync_backlog = self
                .highest_synced_checkpoint
                .map(|synced| backlog(host, "sync", known, synced));
        }
    }

    /// Flag values carried over without a completed poll.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Recompute both sync percentages against the reference host.
    pub fn update_sync(&mut self, reference: &Metrics) {
        self.tx_sync_percentage = self
            .transactions()
            .zip(reference.transactions())
            .map(|(host, reference)| sync_percentage(host, reference));
        self.checkpoint_sync_percentage = self
            .checkpoint()
            .zip(reference.checkpoint())
            .map(|(host, reference)| sync_percentage(host, reference));
    }

    fn mark_updated(&mut self) {
        self.round.any = true;
        self.updated = true;
        self.last_updated = Some(Utc::now());
    }
}

fn backlog(host: &str, kind: &str, known: u64, applied: u64) -> u64 {
    if applied > known {
        tracing::warn!(
            host,
            kind,
            known,
            applied,
            "checkpoint backlog is negative; metrics look stale or inconsistent"
        );
        return 0;
    }
    known - applied
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn rate_unavailable_until_window_is_full() {
        let mut window = RateWindow::new(10, SECOND);
        for step in 0..9u64 {
            assert_eq!(window.push(step * 50), None, "sample {step} should not yield a rate");
        }
        assert_eq!(window.push(450), Some(50));
        assert_eq!(window.len(), 9);
    }

    #[test]
    fn rate_tracks_constant_increase_after_warmup() {
        let mut window = RateWindow::new(5, SECOND);
        let mut rates = Vec::new();
        for step in 0..20u64 {
            if let Some(rate) = window.push(1_000 + step * 37) {
                rates.push(rate);
            }
        }
        assert_eq!(rates.len(), 16);
        assert!(rates.iter().all(|rate| *rate == 37));
    }

    #[test]
    fn rate_scales_with_sample_interval() {
        let mut window = RateWindow::new(3, Duration::from_secs(5));
        window.push(0);
        window.push(100);
        assert_eq!(window.push(200), Some(20));
    }

    #[test]
    fn rate_is_zero_after_counter_reset() {
        let mut window = RateWindow::new(2, SECOND);
        window.push(500);
        assert_eq!(window.push(10), Some(0));
    }

    #[test]
    fn sync_percentage_bounds() {
        assert_eq!(sync_percentage(0, 1_000), 0);
        assert_eq!(sync_percentage(985, 1_000), 98);
        assert_eq!(sync_percentage(999, 1_000), 99);
        assert_eq!(sync_percentage(1_000, 1_000), 100);
        assert_eq!(sync_percentage(5_000, 1_000), 100);
        assert_eq!(sync_percentage(0, 0), 100);
        assert_eq!(sync_percentage(u64::MAX - 1, u64::MAX), 99);
    }

    #[test]
    fn sync_percentage_stays_in_range_for_increasing_inputs() {
        for reference in [1u64, 7, 100, 12_345, 9_999_999] {
            for host in (0..=reference).step_by((reference / 13).max(1) as usize) {
                let pct = sync_percentage(host, reference);
                assert!(pct <= 100);
                assert_eq!(pct == 100, host >= reference);
            }
        }
    }

    #[test]
    fn updated_flag_never_reverts() {
        let mut metrics = Metrics::new(10, SECOND);
        assert!(!metrics.is_updated());
        metrics.set_total_transactions(10);
        assert!(metrics.is_updated());
        metrics.apply_scrape(ScrapeSample::default());
        metrics.finish_round("host");
        assert!(metrics.is_updated());
        assert_eq!(metrics.total_transactions, Some(10));
    }

    #[test]
    fn rate_windows_skip_rounds_without_fresh_counters() {
        let mut metrics = Metrics::new(3, SECOND);
        for (total, checkpoint) in [(1_000, 50), (1_100, 54)] {
            metrics.set_total_transactions(total);
            metrics.set_latest_checkpoint(checkpoint);
            metrics.finish_round("host");
            assert!(!metrics.stale);
        }
        // Nothing answered this round.
        metrics.finish_round("host");
        assert!(metrics.stale);
        assert_eq!(metrics.transactions_per_second, None);
        assert_eq!(metrics.checkpoints_per_second, None);

        for step in 0..3u64 {
            metrics.set_total_transactions(1_300 + step * 100);
            metrics.set_latest_checkpoint(62 + step * 4);
            metrics.finish_round("host");
        }
        assert!(!metrics.stale);
        assert_eq!(metrics.transactions_per_second, Some(100));
        assert_eq!(metrics.checkpoints_per_second, Some(4));
    }

    #[test]
    fn scraped_certificates_do_not_feed_rates_behind_rpc_totals() {
        let mut metrics = Metrics::new(2, SECOND);
        metrics.set_total_transactions(1_000);
        metrics.finish_round("host");
        metrics.apply_scrape(ScrapeSample {
            total_transaction_certificates: Some(1_500),
            ..ScrapeSample::default()
        });
        metrics.finish_round("host");
        assert!(!metrics.stale);
        assert_eq!(metrics.transactions_per_second, None);
    }

    #[test]
    fn backlog_clamps_inconsistent_values() {
        let mut metrics = Metrics::new(10, SECOND);
        metrics.apply_scrape(ScrapeSample {
            highest_known_checkpoint: Some(100),
            highest_synced_checkpoint: Some(90),
            last_executed_checkpoint: Some(120),
            ..ScrapeSample::default()
        });
        metrics.finish_round("host");
        assert_eq!(metrics.checkpoint_sync_backlog, Some(10));
        assert_eq!(metrics.checkpoint_exec_backlog, Some(0));
    }

    #[test]
    fn scraped_certificates_stand_in_for_rpc_totals() {
        let mut metrics = Metrics::new(10, SECOND);
        metrics.apply_scrape(ScrapeSample {
            total_transaction_certificates: Some(900),
            last_executed_checkpoint: Some(40),
            ..ScrapeSample::default()
        });
        assert_eq!(metrics.transactions(), Some(900));
        assert_eq!(metrics.checkpoint(), Some(40));
        metrics.set_total_transactions(950);
        assert_eq!(metrics.transactions(), Some(950));
    }

    #[test]
    fn update_sync_uses_reference_values() {
        let mut reference = Metrics::new(10, SECOND);
        reference.set_total_transactions(10_000);
        reference.set_latest_checkpoint(500);
        let mut host = Metrics::new(10, SECOND);
        host.set_total_transactions(9_850);
        host.set_latest_checkpoint(490);
        host.update_sync(&reference);
        assert_eq!(host.tx_sync_percentage, Some(98));
        assert_eq!(host.checkpoint_sync_percentage, Some(98));
    }
}
