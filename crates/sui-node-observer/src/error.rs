// Numan Thabit 2025
use std::{fmt, time::Duration};

use serde::Serialize;

use crate::address::Group;

/// Sub-fetch performed against a monitored host during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Rpc,
    Metrics,
    SystemState,
    IpInfo,
}

impl FetchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Rpc => "rpc",
            FetchKind::Metrics => "metrics",
            FetchKind::SystemState => "system_state",
            FetchKind::IpInfo => "ip_info",
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// Bad or missing address/port for a group. Fatal for that group only.
    #[error("invalid {group} configuration: {reason}")]
    Configuration { group: Group, reason: String },
    #[error("{kind} fetch from {host} timed out after {timeout:?}")]
    FetchTimeout {
        host: String,
        kind: FetchKind,
        timeout: Duration,
    },
    #[error("{kind} fetch from {host} failed: {reason}")]
    FetchFailure {
        host: String,
        kind: FetchKind,
        reason: String,
    },
    /// The reference RPC host produced no data this round.
    #[error("reference host {address} could not be reached")]
    ReferenceUnavailable { address: String },
}

impl ObserverError {
    pub(crate) fn config(group: Group, reason: impl Into<String>) -> Self {
        Self::Configuration {
            group,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> Option<FetchKind> {
        match self {
            Self::FetchTimeout { kind, .. } | Self::FetchFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ObserverError>;
