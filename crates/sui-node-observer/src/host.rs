// Numan Thabit 2025
use std::{cmp::Ordering, time::Duration};

use chrono::Utc;
use serde::Serialize;

use crate::{
    address::{AddressInfo, Group},
    geo::IpInfo,
    health::Status,
    store::Metrics,
};

#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub group: Group,
    pub info: AddressInfo,
    pub status: Status,
    pub location: Option<IpInfo>,
    pub metrics: Metrics,
}

impl Host {
    pub fn new(group: Group, info: AddressInfo, window: usize, interval: Duration) -> Self {
        Self {
            group,
            info,
            status: Status::Grey,
            location: None,
            metrics: Metrics::new(window, interval),
        }
    }

    pub fn address(&self) -> &str {
        self.info.address()
    }

    /// Per-group ordering: status descending, then the group's progress
    /// counter descending.
    pub fn rank(&self, other: &Host) -> Ordering {
        let progress = |host: &Host| match host.group {
            Group::Rpc | Group::Node => host.metrics.transactions(),
            Group::Validator | Group::Peers => host.metrics.checkpoint(),
        };
        other
            .status
            .cmp(&self.status)
            .then_with(|| progress(other).cmp(&progress(self)))
            .then_with(|| self.address().cmp(other.address()))
    }

    /// Column values for presentation adapters, in display order.
    pub fn cells(&self) -> Vec<Cell> {
        let m = &self.metrics;
        let mut cells = vec![
            ("address", CellValue::Text(self.address().to_string())),
            ("status", CellValue::Status(self.status)),
        ];
        match self.group {
            Group::Rpc => {
                cells.extend([
                    ("transactions", CellValue::count(m.transactions())),
                    ("tps", CellValue::count(m.transactions_per_second)),
                    ("checkpoint", CellValue::count(m.checkpoint())),
                    ("cps", CellValue::count(m.checkpoints_per_second)),
                    ("tx_sync", CellValue::percentage(m.tx_sync_percentage)),
                    ("checkpoint_sync", CellValue::percentage(m.checkpoint_sync_percentage)),
                ]);
                if let Some(state) = &m.system_state {
                    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
                    cells.push(("epoch", CellValue::Count(state.epoch)));
                    cells.push(("validators", CellValue::Count(state.validator_count() as u64)));
                    cells.push((
                        "median_gas_price",
                        CellValue::count(state.gas_price_stats().map(|stats| stats.median)),
                    ));
                    cells.push((
                        "epoch_progress",
                        CellValue::Donut {
                            value: state.epoch_progress(now_ms) as u64,
                            total: 100,
                        },
                    ));
                }
            }
            Group::Node => cells.extend([
                ("transactions", CellValue::count(m.transactions())),
                ("tps", CellValue::count(m.transactions_per_second)),
                ("checkpoint", CellValue::count(m.checkpoint())),
                ("tx_sync", CellValue::percentage(m.tx_sync_percentage)),
                ("checkpoint_sync", CellValue::percentage(m.checkpoint_sync_percentage)),
                ("exec_backlog", CellValue::count(m.checkpoint_exec_backlog)),
                ("sync_backlog", CellValue::count(m.checkpoint_sync_backlog)),
                ("peers", CellValue::count(m.number_of_peers)),
                ("uptime", CellValue::count(m.uptime_secs)),
                ("version", CellValue::text(m.version.as_deref())),
                ("commit", CellValue::text(m.commit.as_deref())),
            ]),
            Group::Validator => cells.extend([
                ("certificates", CellValue::count(m.total_transaction_certificates)),
                ("effects", CellValue::count(m.total_transaction_effects)),
                ("checkpoint", CellValue::count(m.checkpoint())),
                ("current_round", CellValue::count(m.current_round)),
                ("highest_received_round", CellValue::count(m.highest_received_round)),
                ("last_committed_round", CellValue::count(m.last_committed_round)),
                ("certificates_created", CellValue::count(m.certificates_created)),
                ("uptime", CellValue::count(m.uptime_secs)),
                ("version", CellValue::text(m.version.as_deref())),
            ]),
            Group::Peers => cells.extend([
                ("transactions", CellValue::count(m.transactions())),
                ("checkpoint", CellValue::count(m.checkpoint())),
                ("checkpoint_sync", CellValue::percentage(m.checkpoint_sync_percentage)),
                ("peers", CellValue::count(m.number_of_peers)),
                ("version", CellValue::text(m.version.as_deref())),
            ]),
        }
        if let Some(location) = &self.location {
            cells.push((
                "location",
                CellValue::Text(format!("{} {}", location.flag, location.country_name)),
            ));
            cells.push(("provider", CellValue::Text(location.provider.clone())));
        }
        cells
            .into_iter()
            .map(|(column, value)| Cell { column, value })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub column: &'static str,
    #[serde(flatten)]
    pub value: CellValue,
}

/// Renderable value handed to table and dashboard adapters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Empty,
    Text(String),
    Count(u64),
    Percentage(u8),
    Donut { value: u64, total: u64 },
    Status(Status),
}

impl CellValue {
    fn count(value: Option<u64>) -> Self {
        value.map_or(CellValue::Empty, CellValue::Count)
    }

    fn percentage(value: Option<u8>) -> Self {
        value.map_or(CellValue::Empty, CellValue::Percentage)
    }

    fn text(value: Option<&str>) -> Self {
        value.map_or(CellValue::Empty, |text| CellValue::Text(text.to_string()))
    }
}
