// Numan Thabit 2025
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    address::Group, controller::Controller, error::ObserverError, state::SnapshotBoard,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    /// No round has completed successfully yet.
    Idle,
    Watching,
    Stopped,
}

/// Re-runs every enabled group on a fixed interval until cancelled.
pub struct WatchLoop {
    controller: Controller,
    board: SnapshotBoard,
    groups: Vec<Group>,
    interval: Duration,
    state: WatchState,
}

impl WatchLoop {
    pub fn new(
        controller: Controller,
        board: SnapshotBoard,
        mut groups: Vec<Group>,
        interval: Duration,
    ) -> Self {
        // Group order puts the reference group first.
        groups.sort();
        groups.dedup();
        Self {
            controller,
            board,
            groups,
            interval,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub async fn run(&mut self, cancel: &CancellationToken) {
        let mut ticker = interval_at(Instant::now(), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            groups = ?self.groups,
            "watch loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick(cancel).await;
            if cancel.is_cancelled() {
                break;
            }
        }

        self.state = WatchState::Stopped;
        tracing::info!(
            rounds = self.board.rounds_completed(),
            "watch loop stopped"
        );
    }

    /// Run one round for each enabled group, in order. Returns the number of
    /// rounds that completed without a hard error.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> usize {
        let mut completed = 0;
        for group in self.groups.clone() {
            if cancel.is_cancelled() {
                break;
            }
            match self.controller.run_round(group, cancel).await {
                Ok(report) => {
                    tracing::info!(
                        %group,
                        hosts = report.hosts,
                        stale = report.stale,
                        elapsed_ms = report.duration.as_millis() as u64,
                        statuses = ?self.controller.status_counts(group),
                        "round complete"
                    );
                    self.board.publish(group, &self.controller);
                    if self.state == WatchState::Idle {
                        self.state = WatchState::Watching;
                    }
                    completed += 1;
                }
                Err(err @ ObserverError::ReferenceUnavailable { .. }) => {
                    tracing::warn!(%group, error = %err, "round degraded");
                    self.board.publish(group, &self.controller);
                }
                Err(err) => {
                    tracing::warn!(%group, error = %err, "round skipped");
                }
            }
        }
        completed
    }
}
