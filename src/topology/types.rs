//! Topology type definitions.
//!
//! Nodes, interfaces, links and the segments derived from them. Everything
//! here is immutable once [`super::Topology`] has been built.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TopologyError;

/// Re-export so topology callers can name the mode without reaching into config
pub use crate::config::RoutingMode;

/// Kind of a declared node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Host,
    Router,
    /// Pure L2 relay, opaque to routing
    Switch,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Host => "Host",
            Self::Router => "Router",
            Self::Switch => "Switch",
        };
        f.write_str(name)
    }
}

/// A declared node with the interfaces it ended up owning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// Interface names in the order their links were declared
    pub interfaces: Vec<String>,
    /// Pinned host address, if any
    pub address: Option<Ipv4Net>,
}

impl Node {
    pub fn is_router(&self) -> bool {
        self.kind == NodeKind::Router
    }

    pub fn is_host(&self) -> bool {
        self.kind == NodeKind::Host
    }
}

/// Globally unique interface identity: owning node plus interface name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId {
    pub node: String,
    pub name: String,
}

impl InterfaceId {
    pub fn new(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.node, self.name)
    }
}

impl Serialize for InterfaceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An endpoint as written in a link declaration: `node` or `node:interface`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub node: String,
    pub interface: Option<String>,
}

impl EndpointSpec {
    pub fn node(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interface: None,
        }
    }

    pub fn interface(node: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interface: Some(interface.into()),
        }
    }
}

impl FromStr for EndpointSpec {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            None if !s.is_empty() => Ok(Self::node(s)),
            Some((node, iface)) if !node.is_empty() && !iface.is_empty() && !iface.contains(':') => {
                Ok(Self::interface(node, iface))
            }
            _ => Err(TopologyError::MalformedEndpoint(s.to_string())),
        }
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interface {
            Some(iface) => write!(f, "{}:{}", self.node, iface),
            None => f.write_str(&self.node),
        }
    }
}

/// A resolved link endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Interface(InterfaceId),
    Switch(String),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interface(id) => id.fmt(f),
            Self::Switch(name) => f.write_str(name),
        }
    }
}

/// An undirected link between exactly two endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Declaration index
    pub index: usize,
    pub a: Endpoint,
    pub b: Endpoint,
}

/// Index of a segment in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SegmentId(pub usize);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of medium a segment is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Shared medium behind a switch
    Lan { switch: String },
    /// A direct interface-to-interface link
    PointToPoint { link: usize },
}

/// Addressing requirements attached to a segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentRequirements {
    pub host_count: Option<usize>,
    pub prefix_len: Option<u8>,
    pub cidr: Option<Ipv4Net>,
    pub pool: Option<Ipv4Net>,
}

/// One broadcast domain: the unit that receives a subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub kind: SegmentKind,
    /// Attached interfaces in attachment order
    pub members: Vec<InterfaceId>,
    pub requirements: SegmentRequirements,
}

impl Segment {
    pub fn is_lan(&self) -> bool {
        matches!(self.kind, SegmentKind::Lan { .. })
    }
}
