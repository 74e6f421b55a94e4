// Numan Thabit 2025
use std::{net::IpAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::ObserverConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub country_code: String,
    pub country_name: String,
    pub flag: String,
    pub provider: String,
}

#[derive(Debug, Deserialize)]
struct LiteResponse {
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    as_name: Option<String>,
}

/// IP geolocation lookups with a short-lived shared cache. Only built when an
/// access token is configured.
#[derive(Clone)]
pub struct GeoLocator {
    client: Client,
    base_url: String,
    token: String,
    ttl: Duration,
    cache: Arc<DashMap<IpAddr, (Instant, IpInfo)>>,
}

impl GeoLocator {
    pub fn from_config(config: &ObserverConfig) -> Result<Option<Self>> {
        let Some(token) = config.ip_lookup.access_token.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(config.ip_lookup_timeout())
            .build()
            .context("failed to build ip lookup client")?;
        Ok(Some(Self {
            client,
            base_url: config.ip_lookup.url.trim_end_matches('/').to_string(),
            token,
            ttl: config.ip_lookup.cache_ttl(),
            cache: Arc::new(DashMap::new()),
        }))
    }

    pub async fn lookup(&self, ip: IpAddr) -> Result<IpInfo> {
        if let Some(entry) = self.cache.get(&ip) {
            let (fetched, info) = entry.value();
            if fetched.elapsed() < self.ttl {
                return Ok(info.clone());
            }
        }

        let response = self
            .client
            .get(format!("{}/{ip}", self.base_url))
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .context("ip lookup request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("ip lookup returned status {}", response.status());
        }
        let body = response
            .json::<LiteResponse>()
            .await
            .context("failed to decode ip lookup body")?;

        let country_code = body.country_code.unwrap_or_default().to_ascii_uppercase();
        let info = IpInfo {
            flag: country_flag(&country_code),
            country_name: body.country.unwrap_or_default(),
            provider: body.as_name.unwrap_or_default(),
            country_code,
        };
        self.cache.insert(ip, (Instant::now(), info.clone()));
        Ok(info)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Regional-indicator flag emoji for an ISO 3166-1 alpha-2 code.
pub fn country_flag(code: &str) -> String {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }
    code.to_ascii_uppercase()
        .chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}
