//! Routing tables and route lookup.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::config::RoutingMode;
use crate::error::UnreachableError;
use crate::topology::InterfaceId;

/// A static route owned by one router
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: Ipv4Net,
    /// Address of the first-hop neighbor on the shared segment
    pub next_hop: Ipv4Addr,
    pub egress: InterfaceId,
    /// Name of the first-hop neighbor router
    pub via: String,
    /// Router hops to the destination's owner
    pub hops: usize,
}

/// A subnet delivered locally, without a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedEntry {
    pub subnet: Ipv4Net,
    pub interface: InterfaceId,
    pub address: Ipv4Addr,
}

/// Result of a longest-prefix lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Connected(&'a ConnectedEntry),
    Routed(&'a Route),
    NoRoute,
}

/// Per-router table: connected subnets plus static routes sorted by destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingTable {
    pub router: String,
    pub connected: Vec<ConnectedEntry>,
    pub routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(router: &str) -> Self {
        Self {
            router: router.to_string(),
            connected: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Longest-prefix match over connected entries and routes; connected wins ties
    pub fn lookup(&self, address: Ipv4Addr) -> Lookup<'_> {
        let connected = self
            .connected
            .iter()
            .filter(|c| c.subnet.contains(&address))
            .max_by_key(|c| c.subnet.prefix_len());
        let routed = self
            .routes
            .iter()
            .filter(|r| r.destination.contains(&address))
            .max_by_key(|r| r.destination.prefix_len());

        match (connected, routed) {
            (Some(c), Some(r)) if r.destination.prefix_len() > c.subnet.prefix_len() => Lookup::Routed(r),
            (Some(c), _) => Lookup::Connected(c),
            (None, Some(r)) => Lookup::Routed(r),
            (None, None) => Lookup::NoRoute,
        }
    }
}

/// Why a hop-by-hop trace stopped short of its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    UnknownRouter(String),
    NoRoute { router: String },
    Loop { path: Vec<String> },
}

/// Routing tables for every router, plus any unreachable pairs recorded in
/// non-strict mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingPlan {
    pub mode: RoutingMode,
    tables: BTreeMap<String, RoutingTable>,
    #[serde(serialize_with = "serialize_gaps")]
    gaps: Vec<UnreachableError>,
}

fn serialize_gaps<S: serde::Serializer>(gaps: &[UnreachableError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(gaps.iter().map(|g| g.to_string()))
}

impl RoutingPlan {
    pub(crate) fn new(mode: RoutingMode, tables: BTreeMap<String, RoutingTable>, gaps: Vec<UnreachableError>) -> Self {
        Self { mode, tables, gaps }
    }

    pub fn table(&self, router: &str) -> Option<&RoutingTable> {
        self.tables.get(router)
    }

    /// Tables ordered by router name
    pub fn tables(&self) -> impl Iterator<Item = &RoutingTable> {
        self.tables.values()
    }

    /// Router pairs left without a path (non-strict planning only)
    pub fn gaps(&self) -> &[UnreachableError] {
        &self.gaps
    }

    pub fn route_count(&self) -> usize {
        self.tables.values().map(|t| t.routes.len()).sum()
    }

    /// Follow routes hop by hop from `router` until a router directly
    /// connected to `destination` is reached. Returns the routers visited.
    pub fn trace(&self, router: &str, destination: Ipv4Addr) -> Result<Vec<String>, TraceError> {
        let mut path = vec![router.to_string()];
        let mut current = router.to_string();

        // A loop-free chain visits each router at most once
        for _ in 0..=self.tables.len() {
            let table = self
                .tables
                .get(&current)
                .ok_or_else(|| TraceError::UnknownRouter(current.clone()))?;

            match table.lookup(destination) {
                Lookup::Connected(_) => return Ok(path),
                Lookup::NoRoute => return Err(TraceError::NoRoute { router: current }),
                Lookup::Routed(route) => {
                    if path.contains(&route.via) {
                        path.push(route.via.clone());
                        return Err(TraceError::Loop { path });
                    }
                    path.push(route.via.clone());
                    current = route.via.clone();
                }
            }
        }

        Err(TraceError::Loop { path })
    }
}
