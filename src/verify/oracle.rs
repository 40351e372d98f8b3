//! Reachability oracle.
//!
//! Derives, purely from the plan, what an external probe between every
//! ordered pair of hosts should observe. No network I/O happens here.

use log::info;
use serde::Serialize;
use std::net::Ipv4Addr;

use crate::config::RoutingMode;
use crate::ip::AddressPlan;
use crate::routing::{RoutingPlan, TraceError};
use crate::topology::{SegmentId, Topology};

/// Expected or observed probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

/// Why the oracle expects what it expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Reason {
    /// Both hosts sit on the same subnet
    SameSubnet,
    /// A route chain exists in both directions
    Routed,
    /// Cross-subnet traffic is not forwarded in this mode
    LocalOnly,
    /// The source's segment has no gateway
    NoGateway { host: String },
    /// Some router on the way has no matching route
    NoRoute { router: String },
    /// The router pair was recorded as unreachable during planning
    Gap { from: String, to: String },
    /// The route chain revisits a router
    Loop { path: Vec<String> },
}

/// Oracle entry for one ordered host pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairExpectation {
    pub source: String,
    pub target: String,
    pub source_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
    pub expected: Reachability,
    pub reason: Reason,
    /// Routers traversed from source to target, for routed pairs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

/// Expected outcome for every ordered pair of distinct hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityMatrix {
    pub mode: RoutingMode,
    pub entries: Vec<PairExpectation>,
}

impl ReachabilityMatrix {
    pub fn expectation(&self, source: &str, target: &str) -> Option<&PairExpectation> {
        self.entries.iter().find(|e| e.source == source && e.target == target)
    }

    pub fn count(&self, expected: Reachability) -> usize {
        self.entries.iter().filter(|e| e.expected == expected).count()
    }

    pub fn all_reachable(&self) -> bool {
        self.entries.iter().all(|e| e.expected == Reachability::Reachable)
    }
}

struct HostSite {
    name: String,
    address: Ipv4Addr,
    segment: SegmentId,
}

/// Build the reachability matrix for a finalized plan
pub fn build_oracle(topology: &Topology, addresses: &AddressPlan, routing: &RoutingPlan) -> ReachabilityMatrix {
    let sites: Vec<HostSite> = topology
        .hosts()
        .filter_map(|host| {
            let interface = topology.host_interface(host)?;
            let address = addresses.interface(&interface)?;
            Some(HostSite {
                name: host.to_string(),
                address: address.address,
                segment: address.segment,
            })
        })
        .collect();

    let mut entries = Vec::with_capacity(sites.len() * sites.len().saturating_sub(1));
    for source in &sites {
        for target in &sites {
            if source.name == target.name {
                continue;
            }
            let (reason, path) = expect_pair(addresses, routing, source, target);
            let expected = match reason {
                Reason::SameSubnet | Reason::Routed => Reachability::Reachable,
                _ => Reachability::Unreachable,
            };
            entries.push(PairExpectation {
                source: source.name.clone(),
                target: target.name.clone(),
                source_ip: source.address,
                target_ip: target.address,
                expected,
                reason,
                path,
            });
        }
    }

    let matrix = ReachabilityMatrix {
        mode: routing.mode,
        entries,
    };
    info!(
        "Reachability oracle: {} pair(s), {} reachable, {} unreachable",
        matrix.entries.len(),
        matrix.count(Reachability::Reachable),
        matrix.count(Reachability::Unreachable)
    );
    matrix
}

fn expect_pair(
    addresses: &AddressPlan,
    routing: &RoutingPlan,
    source: &HostSite,
    target: &HostSite,
) -> (Reason, Vec<String>) {
    if source.segment == target.segment {
        return (Reason::SameSubnet, Vec::new());
    }
    if !routing.mode.forwards() {
        return (Reason::LocalOnly, Vec::new());
    }

    let forward = match trace_from_host(addresses, routing, source, target.address) {
        Ok(path) => path,
        Err(reason) => return (reason, Vec::new()),
    };
    // Replies need the return chain as well
    if let Err(reason) = trace_from_host(addresses, routing, target, source.address) {
        return (reason, Vec::new());
    }

    (Reason::Routed, forward)
}

fn trace_from_host(
    addresses: &AddressPlan,
    routing: &RoutingPlan,
    host: &HostSite,
    destination: Ipv4Addr,
) -> Result<Vec<String>, Reason> {
    let no_gateway = || Reason::NoGateway {
        host: host.name.clone(),
    };
    let gateway = addresses.subnet(host.segment).gateway.ok_or_else(no_gateway)?;
    let router = addresses.owner_of(gateway).ok_or_else(no_gateway)?;

    routing.trace(&router.node, destination).map_err(|e| match e {
        TraceError::NoRoute { router } => {
            let gap = addresses.subnet_containing(destination).and_then(|subnet| {
                routing
                    .gaps()
                    .iter()
                    .find(|g| g.from == router && g.subnet == subnet.cidr)
            });
            match gap {
                Some(g) => Reason::Gap {
                    from: g.from.clone(),
                    to: g.to.clone(),
                },
                None => Reason::NoRoute { router },
            }
        }
        TraceError::UnknownRouter(router) => Reason::NoRoute { router },
        TraceError::Loop { path } => Reason::Loop { path },
    })
}
