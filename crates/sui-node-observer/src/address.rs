// Numan Thabit 2025
//! Turns configured RPC URLs, node/validator addresses and peer multiaddresses
//! into resolved [`AddressInfo`] records.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    net::IpAddr,
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::{net::lookup_host, sync::OnceCell};
use url::Url;

use crate::{
    config::{FullNodeConfig, ObserverConfig, ValidatorConfig},
    error::{ObserverError, Result},
};

pub const DEFAULT_RPC_PORT: &str = "9000";
pub const DEFAULT_METRICS_PORT: &str = "9184";
pub const DEFAULT_PEER_PORT: &str = "8084";

/// Logical host group; each group is polled and sorted independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Rpc,
    Node,
    Validator,
    Peers,
}

impl Group {
    pub const ALL: [Group; 4] = [Group::Rpc, Group::Node, Group::Validator, Group::Peers];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Rpc => "rpc",
            Group::Node => "node",
            Group::Validator => "validator",
            Group::Peers => "peers",
        }
    }

    /// The RPC group holds the reference host and is the only group that
    /// fetches the full system state.
    pub fn is_reference(&self) -> bool {
        matches!(self, Group::Rpc)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(Group::Rpc),
            "node" => Ok(Group::Node),
            "validator" => Ok(Group::Validator),
            "peers" | "peer" => Ok(Group::Peers),
            other => Err(format!(
                "unknown group {other}; expected rpc, node, validator or peers"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Rpc,
    Metrics,
    Peer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Address exactly as configured; used as the host identity.
    pub address: String,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub ip: Option<IpAddr>,
    pub port: Option<String>,
    pub path: Option<String>,
}

impl Endpoint {
    /// Host to connect to: the DNS name when one was configured, otherwise
    /// the (possibly rewritten) IP.
    pub fn connect_host(&self) -> String {
        match (&self.host, self.ip) {
            (Some(host), _) => host.clone(),
            (None, Some(IpAddr::V6(ip))) => format!("[{ip}]"),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => self.address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    pub endpoint: Endpoint,
    pub ports: BTreeMap<PortType, String>,
}

impl AddressInfo {
    pub fn address(&self) -> &str {
        &self.endpoint.address
    }

    pub fn port(&self, port: PortType) -> Option<&str> {
        self.ports.get(&port).map(String::as_str)
    }

    /// Candidate JSON-RPC URLs in the order they should be tried. Without an
    /// explicit scheme plain HTTP goes first and HTTPS is the single fallback.
    pub fn rpc_urls(&self) -> Vec<String> {
        let Some(port) = self.port(PortType::Rpc) else {
            return Vec::new();
        };
        let host = self.endpoint.connect_host();
        let path = self.endpoint.path.as_deref().unwrap_or("");
        match &self.endpoint.scheme {
            Some(scheme) => vec![format!("{scheme}://{host}:{port}{path}")],
            None => vec![
                format!("http://{host}:{port}{path}"),
                format!("https://{host}:{port}{path}"),
            ],
        }
    }

    pub fn metrics_url(&self) -> Option<String> {
        let port = self.port(PortType::Metrics)?;
        Some(format!(
            "http://{}:{port}/metrics",
            self.endpoint.connect_host()
        ))
    }
}

/// Parses `host:port`, `ip:port` or `scheme://host[:port][/path]`.
pub fn parse_endpoint(
    address: &str,
    default_port: Option<&str>,
) -> std::result::Result<Endpoint, String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err("address is empty".to_string());
    }

    if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|err| format!("invalid url {trimmed}: {err}"))?;
        let (host, ip) = split_host(&url, trimmed)?;
        let port = match url.port() {
            Some(0) => return Err(format!("port 0 is not valid in {trimmed}")),
            Some(port) => Some(port.to_string()),
            None => url.port_or_known_default().map(|port| port.to_string()),
        };
        let path = match url.path() {
            "" | "/" => None,
            path => Some(path.to_string()),
        };
        return Ok(Endpoint {
            address: trimmed.to_string(),
            scheme: Some(url.scheme().to_string()),
            host,
            ip,
            port,
            path,
        });
    }

    let (host_part, port) = match explicit_port(trimmed) {
        Some((host, port)) => (host, Some(validate_port(port)?)),
        None => (trimmed, default_port.map(str::to_string)),
    };
    let url = Url::parse(&format!("http://{host_part}"))
        .map_err(|err| format!("invalid address {trimmed}: {err}"))?;
    let (host, ip) = split_host(&url, trimmed)?;
    Ok(Endpoint {
        address: trimmed.to_string(),
        scheme: None,
        host,
        ip,
        port,
        path: None,
    })
}

/// Parses `/<dns|dns4|dns6|ip4|ip6>/<host>/<udp|tcp>/<port>`.
pub fn parse_peer(address: &str) -> std::result::Result<Endpoint, String> {
    let trimmed = address.trim();
    let segments: Vec<&str> = trimmed.split('/').collect();
    let ["", protocol, host, transport, port] = segments.as_slice() else {
        return Err(format!(
            "peer address {trimmed} does not match /<dns|ip4|ip6>/<host>/<udp|tcp>/<port>"
        ));
    };
    if !matches!(*transport, "udp" | "tcp") {
        return Err(format!("peer address {trimmed} uses unknown transport {transport}"));
    }
    if host.is_empty() {
        return Err(format!("peer address {trimmed} has an empty host"));
    }
    let port = validate_port(port)?;
    let (host, ip) = match *protocol {
        "dns" | "dns4" | "dns6" => (Some(host.to_string()), None),
        "ip4" | "ip6" => {
            let ip = host
                .parse::<IpAddr>()
                .map_err(|err| format!("peer address {trimmed} has invalid ip: {err}"))?;
            (None, Some(ip))
        }
        other => {
            return Err(format!(
                "peer address {trimmed} uses unknown protocol {other}"
            ))
        }
    };
    Ok(Endpoint {
        address: trimmed.to_string(),
        scheme: None,
        host,
        ip,
        port: Some(port),
        path: None,
    })
}

fn explicit_port(address: &str) -> Option<(&str, &str)> {
    let (host, port) = address.rsplit_once(':')?;
    // Bare IPv6 literals carry colons of their own.
    if host.is_empty() || (host.contains(':') && !host.ends_with(']')) {
        return None;
    }
    Some((host, port))
}

fn validate_port(port: &str) -> std::result::Result<String, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("port {port} is not in 1..=65535")),
        Ok(value) => Ok(value.to_string()),
    }
}

fn split_host(
    url: &Url,
    address: &str,
) -> std::result::Result<(Option<String>, Option<IpAddr>), String> {
    match url.host() {
        Some(url::Host::Domain(domain)) => Ok((Some(domain.to_string()), None)),
        Some(url::Host::Ipv4(ip)) => Ok((None, Some(IpAddr::V4(ip)))),
        Some(url::Host::Ipv6(ip)) => Ok((None, Some(IpAddr::V6(ip)))),
        None => Err(format!("address {address} has no host")),
    }
}

enum PublicIpSource {
    Fixed(IpAddr),
    Lookup { client: Client, url: String },
}

pub struct AddressResolver {
    source: PublicIpSource,
    public_ip: OnceCell<Option<IpAddr>>,
}

impl AddressResolver {
    pub fn new(config: &ObserverConfig) -> anyhow::Result<Self> {
        if let Some(ip) = config.public_ip.address {
            return Ok(Self::with_public_ip(ip));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .context("failed to construct public ip client")?;
        Ok(Self {
            source: PublicIpSource::Lookup {
                client,
                url: config.public_ip.url.clone(),
            },
            public_ip: OnceCell::new(),
        })
    }

    pub fn with_public_ip(ip: IpAddr) -> Self {
        Self {
            source: PublicIpSource::Fixed(ip),
            public_ip: OnceCell::new(),
        }
    }

    /// Resolve a group's configured entries into deduplicated address records.
    pub async fn resolve(&self, group: Group, config: &ObserverConfig) -> Result<Vec<AddressInfo>> {
        let parsed = parse_group(group, config)?;
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(parsed.len());
        for info in parsed {
            if !seen.insert(info.endpoint.address.clone()) {
                tracing::debug!(%group, address = %info.endpoint.address, "dropping duplicate address");
                continue;
            }
            let endpoint = self.finalize(info.endpoint).await;
            resolved.push(AddressInfo {
                endpoint,
                ports: info.ports,
            });
        }
        Ok(resolved)
    }

    async fn finalize(&self, mut endpoint: Endpoint) -> Endpoint {
        if let Some(host) = endpoint.host.clone() {
            let port = endpoint
                .port
                .as_deref()
                .and_then(|port| port.parse::<u16>().ok())
                .unwrap_or(0);
            match lookup_host((host.as_str(), port)).await {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        endpoint.ip = Some(addr.ip());
                        if is_local(addr.ip()) {
                            // A local name cannot be reached from elsewhere; connect by IP.
                            endpoint.host = None;
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(%host, error = %err, "dns resolution failed; keeping hostname");
                }
            }
        }

        if let Some(ip) = endpoint.ip.filter(|ip| is_local(*ip)) {
            match self.public_ip().await {
                Some(public) => endpoint.ip = Some(public),
                None => {
                    tracing::warn!(address = %endpoint.address, %ip, "public ip unknown; keeping local address")
                }
            }
        }
        endpoint
    }

    async fn public_ip(&self) -> Option<IpAddr> {
        *self
            .public_ip
            .get_or_init(|| async {
                match &self.source {
                    PublicIpSource::Fixed(ip) => Some(*ip),
                    PublicIpSource::Lookup { client, url } => match lookup_public_ip(client, url).await {
                        Ok(ip) => {
                            tracing::info!(%ip, "discovered public ip");
                            Some(ip)
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to discover public ip");
                            None
                        }
                    },
                }
            })
            .await
    }
}

async fn lookup_public_ip(client: &Client, url: &str) -> anyhow::Result<IpAddr> {
    let body = client
        .get(url)
        .send()
        .await
        .context("public ip request failed")?
        .error_for_status()
        .context("public ip endpoint returned an error")?
        .text()
        .await
        .context("failed to read public ip body")?;
    body.trim()
        .parse()
        .with_context(|| format!("public ip endpoint returned {body:?}"))
}

fn is_local(ip: IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}

fn parse_group(group: Group, config: &ObserverConfig) -> Result<Vec<AddressInfo>> {
    let infos = match group {
        Group::Rpc => collect_entries(&config.public_rpc, |address| rpc_entry(address)),
        Group::Node => collect_entries(&config.full_nodes, node_entry),
        Group::Validator => {
            collect_entries(&config.validators, |validator| validator_entry(validator))
        }
        Group::Peers => collect_entries(&config.peers, |address| peer_entry(address)),
    }
    .map_err(|reason| ObserverError::config(group, reason))?;

    if infos.is_empty() {
        return Err(ObserverError::config(group, "no entries configured"));
    }
    Ok(infos)
}

fn collect_entries<T, F>(entries: &[T], parse: F) -> std::result::Result<Vec<AddressInfo>, String>
where
    F: Fn(&T) -> std::result::Result<AddressInfo, String>,
{
    entries.iter().map(parse).collect()
}

fn rpc_entry(address: &str) -> std::result::Result<AddressInfo, String> {
    let endpoint = parse_endpoint(address, Some(DEFAULT_RPC_PORT))?;
    let port = endpoint
        .port
        .clone()
        .unwrap_or_else(|| DEFAULT_RPC_PORT.to_string());
    Ok(AddressInfo {
        endpoint,
        ports: BTreeMap::from([(PortType::Rpc, port)]),
    })
}

fn node_entry(node: &FullNodeConfig) -> std::result::Result<AddressInfo, String> {
    let endpoint = parse_endpoint(&node.json_rpc_address, Some(DEFAULT_RPC_PORT))?;
    let rpc_port = endpoint
        .port
        .clone()
        .unwrap_or_else(|| DEFAULT_RPC_PORT.to_string());
    // Metrics are scraped from the RPC host, so only the port is taken.
    let metrics_port = match node.metrics_address.as_deref() {
        Some(address) => {
            let metrics = parse_endpoint(address, Some(DEFAULT_METRICS_PORT))?;
            if !same_host(&endpoint, &metrics) {
                return Err(format!(
                    "metrics address {address} is not on the same host as {}",
                    node.json_rpc_address
                ));
            }
            metrics
                .port
                .unwrap_or_else(|| DEFAULT_METRICS_PORT.to_string())
        }
        None => DEFAULT_METRICS_PORT.to_string(),
    };
    Ok(AddressInfo {
        endpoint,
        ports: BTreeMap::from([(PortType::Rpc, rpc_port), (PortType::Metrics, metrics_port)]),
    })
}

fn same_host(a: &Endpoint, b: &Endpoint) -> bool {
    match (&a.host, a.ip, &b.host, b.ip) {
        (Some(a), _, Some(b), _) => a.eq_ignore_ascii_case(b),
        (None, Some(a), None, Some(b)) => a == b || (is_local(a) && is_local(b)),
        _ => false,
    }
}

fn validator_entry(validator: &ValidatorConfig) -> std::result::Result<AddressInfo, String> {
    let endpoint = parse_endpoint(&validator.metrics_address, Some(DEFAULT_METRICS_PORT))?;
    let port = endpoint
        .port
        .clone()
        .unwrap_or_else(|| DEFAULT_METRICS_PORT.to_string());
    Ok(AddressInfo {
        endpoint,
        ports: BTreeMap::from([(PortType::Metrics, port)]),
    })
}

fn peer_entry(address: &str) -> std::result::Result<AddressInfo, String> {
    let endpoint = parse_peer(address)?;
    let peer_port = endpoint
        .port
        .clone()
        .unwrap_or_else(|| DEFAULT_PEER_PORT.to_string());
    Ok(AddressInfo {
        endpoint,
        ports: BTreeMap::from([
            (PortType::Rpc, DEFAULT_RPC_PORT.to_string()),
            (PortType::Metrics, DEFAULT_METRICS_PORT.to_string()),
            (PortType::Peer, peer_port),
        ]),
    })
}
