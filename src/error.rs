//! Error taxonomy for the planning pipeline.
//!
//! Planning errors are deterministic: the same input always yields the same
//! error, so nothing here is retried. Only [`ProbeTimeout`] belongs to the
//! live verification phase.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

use crate::config::ValidationError;

/// Malformed or inconsistent topology declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("Node name cannot be empty")]
    EmptyNodeName,

    #[error("Link #{link} references unknown node '{node}'")]
    UnknownNode { link: usize, node: String },

    #[error("Link #{link} references interface '{interface}' on switch '{node}'; switches own no interfaces")]
    InterfaceOnSwitch { link: usize, node: String, interface: String },

    #[error("Malformed endpoint '{0}', expected 'node' or 'node:interface'")]
    MalformedEndpoint(String),

    #[error("Link #{link} connects '{a}' and '{b}', only interface-interface or interface-switch links are supported")]
    UnsupportedLink { link: usize, a: String, b: String },

    #[error("Interface '{interface}' is attached to more than one link (links #{first} and #{second})")]
    InterfaceReused { interface: String, first: usize, second: usize },

    #[error("Host '{host}' owns exactly one interface but link #{link} attaches '{interface}'")]
    HostMultihomed { host: String, interface: String, link: usize },

    #[error("{kind} '{node}' is not attached to any link")]
    DetachedNode { node: String, kind: String },

    #[error("Switch '{0}' cannot be given an address")]
    SwitchAddressed(String),

    #[error("Router '{0}' cannot be given a node-level address; router interfaces are planned")]
    RouterAddressed(String),

    #[error("Segment requirements name '{0}', which is not a switch")]
    NotASwitch(String),

    #[error("LAN segment '{0}' has no router attachment but inter-LAN routing is requested")]
    SegmentWithoutRouter(String),
}

/// Address-pool exhaustion or an impossible addressing request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("No address pools were provided")]
    NoPools,

    #[error("Segment '{segment}' references pool {pool}, which is not declared")]
    UnknownPool { segment: String, pool: Ipv4Net },

    #[error("Prefix /{prefix_len} for segment '{segment}' is outside the supported range /1../30")]
    InvalidPrefix { segment: String, prefix_len: u8 },

    #[error("Segment '{segment}' needs {required} usable addresses but /{prefix_len} only offers {usable}")]
    PrefixTooSmall { segment: String, prefix_len: u8, required: usize, usable: usize },

    #[error("Segment '{segment}' needs {required} usable addresses, more than any /30../1 subnet offers")]
    SegmentTooLarge { segment: String, required: usize },

    #[error("Segment '{segment}' requests a /{prefix_len}, which does not fit in any pool")]
    PrefixExceedsPool { segment: String, prefix_len: u8 },

    #[error("Pools exhausted: no free /{prefix_len} left for segment '{segment}'")]
    PoolExhausted { segment: String, prefix_len: u8 },

    #[error("Pinned subnet {cidr} for segment '{segment}' lies outside every pool")]
    OutsidePools { segment: String, cidr: Ipv4Net },

    #[error("Pinned subnet {cidr} for segment '{segment}' overlaps allocated subnet {existing}")]
    Overlap { segment: String, cidr: Ipv4Net, existing: Ipv4Net },

    #[error("Segment '{segment}' requests /{prefix_len} but its pinned subnet is {cidr}")]
    PinnedPrefixMismatch { segment: String, cidr: Ipv4Net, prefix_len: u8 },

    #[error("Pinned subnet {cidr} for segment '{segment}' lies outside its requested pool {pool}")]
    PinnedOutsidePool { segment: String, cidr: Ipv4Net, pool: Ipv4Net },

    #[error("Pinned address {address} of host '{host}' disagrees with subnet {cidr} of segment '{segment}'")]
    PinOutsideSubnet { host: String, address: Ipv4Net, segment: String, cidr: Ipv4Net },

    #[error("Address {address} in segment '{segment}' is claimed by both '{first}' and '{second}'")]
    AddressConflict { segment: String, address: Ipv4Addr, first: String, second: String },
}

/// No router path exists towards the owner of a destination subnet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Router '{from}' has no path to router '{to}' (owner of {subnet})")]
pub struct UnreachableError {
    pub from: String,
    pub to: String,
    pub subnet: Ipv4Net,
}

/// A single verification probe did not answer in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Probe {from} -> {to} timed out after {attempts} attempt(s) of {timeout:?}")]
pub struct ProbeTimeout {
    pub from: String,
    pub to: String,
    pub timeout: Duration,
    pub attempts: u32,
}

/// A finalized plan broke one of its own structural guarantees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Subnets {a} and {b} overlap")]
    Overlap { a: Ipv4Net, b: Ipv4Net },

    #[error("Interface '{interface}' address {address} lies outside subnet {cidr}")]
    Containment { interface: String, address: Ipv4Addr, cidr: Ipv4Net },

    #[error("Address {address} is assigned to both '{first}' and '{second}'")]
    DuplicateAddress { address: Ipv4Addr, first: String, second: String },

    #[error("Router '{router}' has more than one route to {destination}")]
    DuplicateRoute { router: String, destination: Ipv4Net },

    #[error("Router '{router}' routes {destination} via {next_hop}, which is not on the subnet of '{egress}'")]
    DanglingNextHop { router: String, destination: Ipv4Net, next_hop: Ipv4Addr, egress: String },

    #[error("Route chain from '{router}' towards {destination} revisits a router: {path:?}")]
    Loop { router: String, destination: Ipv4Net, path: Vec<String> },

    #[error("Route chain from '{router}' towards {destination} dead-ends at '{stuck_at}'")]
    Unterminated { router: String, destination: Ipv4Net, stuck_at: String },
}

/// Any failure of the offline planning pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Unreachable: {0}")]
    Unreachable(#[from] UnreachableError),

    #[error("Plan invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}
