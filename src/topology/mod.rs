//! Network topology module.
//!
//! This module models nodes, interfaces, links and the segments they form,
//! validates the declared structure, and exposes the router adjacency graph
//! consumed by route planning.

pub mod types;
pub mod builder;
pub mod graph;

// Re-export key types for easier access
pub use types::{
    Endpoint, EndpointSpec, InterfaceId, Link, Node, NodeKind, RoutingMode, Segment, SegmentId,
    SegmentKind, SegmentRequirements,
};
pub use builder::{TopologyBuilder, DEFAULT_HOST_INTERFACE};
pub use graph::{Adjacency, RouterGraph, Topology};
