// Numan Thabit 2025
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::{address::Group, controller::Controller, host::Host};

#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    pub group: Group,
    pub round: u64,
    pub published_at: DateTime<Utc>,
    pub reference: Option<String>,
    pub reference_available: bool,
    pub hosts: Vec<Host>,
}

/// Latest published host list per group. Written once per round by the watch
/// loop; presentation adapters only read it.
#[derive(Clone, Debug, Default)]
pub struct SnapshotBoard {
    inner: Arc<DashMap<Group, GroupSnapshot>>,
    rounds: Arc<AtomicU64>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, group: Group, controller: &Controller) {
        let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.insert(
            group,
            GroupSnapshot {
                group,
                round,
                published_at: Utc::now(),
                reference: controller.reference().map(str::to_string),
                reference_available: controller.reference_available(),
                hosts: controller.hosts(group).to_vec(),
            },
        );
    }

    pub fn snapshots(&self) -> Vec<GroupSnapshot> {
        let mut snapshots: Vec<GroupSnapshot> =
            self.inner.iter().map(|entry| entry.value().clone()).collect();
        snapshots.sort_by_key(|snapshot| snapshot.group);
        snapshots
    }

    pub fn get(&self, group: Group) -> Option<GroupSnapshot> {
        self.inner.get(&group).map(|entry| entry.value().clone())
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }
}
