// Numan Thabit 2025
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds, DurationSeconds};
use tokio::fs;

use crate::{address::Group, health::HealthThresholds};

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_http_bind")]
    pub http_bind: SocketAddr,
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub refresh_interval: Option<Duration>,
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub rpc_timeout_ms: Option<Duration>,
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub metrics_timeout_ms: Option<Duration>,
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub ip_lookup_timeout_ms: Option<Duration>,
    /// Number of samples kept per rate window.
    #[serde(default = "default_rate_window")]
    pub rate_window: usize,
    #[serde(default)]
    pub groups: Option<Vec<Group>>,
    #[serde(default)]
    pub public_rpc: Vec<String>,
    #[serde(default)]
    pub full_nodes: Vec<FullNodeConfig>,
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub ip_lookup: IpLookupConfig,
    #[serde(default)]
    pub public_ip: PublicIpConfig,
    #[serde(default)]
    pub health: HealthThresholds,
}

impl ObserverConfig {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse config as TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.rate_window >= 2,
            "rate_window must hold at least two samples"
        );
        anyhow::ensure!(
            !self.refresh_interval().is_zero(),
            "refresh_interval must be > 0"
        );
        anyhow::ensure!(
            !self.rpc_timeout().is_zero() && !self.metrics_timeout().is_zero(),
            "fetch timeouts must be > 0"
        );
        anyhow::ensure!(
            self.health.sync_high_water <= 100,
            "health.sync_high_water is a percentage and must be <= 100"
        );
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
            .unwrap_or_else(|| Duration::from_secs(5))
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout_ms
            .unwrap_or_else(|| Duration::from_millis(3_000))
    }

    pub fn metrics_timeout(&self) -> Duration {
        self.metrics_timeout_ms
            .unwrap_or_else(|| Duration::from_millis(3_000))
    }

    pub fn ip_lookup_timeout(&self) -> Duration {
        self.ip_lookup_timeout_ms
            .unwrap_or_else(|| Duration::from_millis(2_000))
    }

    /// Enabled groups, reference group first. The RPC group is always polled
    /// because every other group is classified against it.
    pub fn enabled_groups(&self) -> Vec<Group> {
        let mut groups = self
            .groups
            .clone()
            .unwrap_or_else(|| Group::ALL.to_vec());
        groups.push(Group::Rpc);
        groups.sort();
        groups.dedup();
        groups
    }
}

fn default_http_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

fn default_rate_window() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullNodeConfig {
    pub json_rpc_address: String,
    #[serde(default)]
    pub metrics_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub metrics_address: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct IpLookupConfig {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_ip_lookup_url")]
    pub url: String,
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub cache_ttl: Option<Duration>,
}

impl Default for IpLookupConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            url: default_ip_lookup_url(),
            cache_ttl: None,
        }
    }
}

impl IpLookupConfig {
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl.unwrap_or_else(|| Duration::from_secs(300))
    }
}

fn default_ip_lookup_url() -> String {
    "https://api.ipinfo.io/lite".to_string()
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct PublicIpConfig {
    /// Skips the lookup when set.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub address: Option<IpAddr>,
    #[serde(default = "default_public_ip_url")]
    pub url: String,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        Self {
            address: None,
            url: default_public_ip_url(),
        }
    }
}

fn default_public_ip_url() -> String {
    "https://api.ipify.org".to_string()
}
