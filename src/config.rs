use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::topology::NodeKind;

/// Routing mode for the whole plan
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RoutingMode {
    /// Only directly connected subnets are reachable; routers do not forward
    LocalOnly,
    /// Every host can reach every other host through static routes
    #[default]
    FullMesh,
}

impl RoutingMode {
    /// Whether routers forward between their attached subnets in this mode
    pub fn forwards(&self) -> bool {
        matches!(self, Self::FullMesh)
    }
}

/// Declarative topology description
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Address pools, in allocation priority order
    pub pools: Vec<Ipv4Net>,
    pub nodes: Vec<NodeConfig>,
    pub links: Vec<LinkConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentConfig>,
    #[serde(default)]
    pub point_to_point: PointToPointConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pools.is_empty() {
            return Err(ValidationError::InvalidPools(
                "at least one address pool is required".to_string(),
            ));
        }

        for (i, a) in self.pools.iter().enumerate() {
            for b in &self.pools[i + 1..] {
                if a.contains(&b.network()) || b.contains(&a.network()) {
                    return Err(ValidationError::InvalidPools(format!(
                        "pools {} and {} overlap",
                        a, b
                    )));
                }
            }
        }

        if let Some(node) = self.nodes.iter().find(|n| n.name.trim().is_empty()) {
            return Err(ValidationError::InvalidNode(format!(
                "node of kind {:?} has an empty name",
                node.kind
            )));
        }

        for segment in &self.segments {
            if let Some(prefix_len) = segment.prefix_len {
                validate_prefix(prefix_len, &segment.switch)?;
            }
        }
        validate_prefix(self.point_to_point.prefix_len, "point_to_point")?;

        if self.probe.workers == 0 {
            return Err(ValidationError::InvalidProbe(
                "workers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the general configuration
    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }
}

fn validate_prefix(prefix_len: u8, owner: &str) -> Result<(), ValidationError> {
    if !(1..=30).contains(&prefix_len) {
        return Err(ValidationError::InvalidSegment(format!(
            "{}: prefix_len /{} must be within /1../30",
            owner, prefix_len
        )));
    }
    Ok(())
}

/// Shared general configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub mode: RoutingMode,
    /// Treat an unreachable router pair as fatal instead of recording a gap
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Also install routes towards router-to-router link subnets
    #[serde(default)]
    pub route_point_to_point: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::FullMesh,
            strict: true,
            route_point_to_point: false,
            log_level: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A node declaration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub kind: NodeKind,
    /// Pinned `address/prefix` for a host's only interface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Net>,
}

/// A link declaration between two endpoints (`node` or `node:interface`)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LinkConfig {
    pub a: String,
    pub b: String,
}

/// Addressing requirements for one LAN segment, keyed by its switch
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SegmentConfig {
    pub switch: String,
    /// Required host count; defaults to the hosts actually attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_len: Option<u8>,
    /// Exact subnet to use instead of allocating one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<Ipv4Net>,
    /// Restrict allocation to this declared pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<Ipv4Net>,
}

/// Addressing for router-to-router links
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PointToPointConfig {
    #[serde(default = "default_p2p_prefix")]
    pub prefix_len: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<Ipv4Net>,
}

impl Default for PointToPointConfig {
    fn default() -> Self {
        Self {
            prefix_len: default_p2p_prefix(),
            pool: None,
        }
    }
}

fn default_p2p_prefix() -> u8 {
    30
}

/// Settings for the external reachability probes
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,
    /// Command template, e.g. `ip netns exec {source} ping -c1 -W{timeout} {target_ip}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout: default_timeout(),
            retries: default_retries(),
            backoff: default_backoff(),
            command: None,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_retries() -> u32 {
    1
}

fn default_backoff() -> Duration {
    Duration::from_millis(250)
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid address pools: {0}")]
    InvalidPools(String),
    #[error("Invalid node: {0}")]
    InvalidNode(String),
    #[error("Invalid segment: {0}")]
    InvalidSegment(String),
    #[error("Invalid probe configuration: {0}")]
    InvalidProbe(String),
}
