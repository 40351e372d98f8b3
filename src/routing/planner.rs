//! Static route computation over the router graph.
//!
//! Each destination subnet gets a multi-source BFS from the routers attached
//! to it. A router then points at the neighbor one hop closer, picking the
//! lexicographically smallest name when several neighbors qualify. Every hop
//! strictly decreases the BFS distance, so the tables are loop-free.

use log::{debug, info, warn};
use std::collections::BTreeMap;

use super::table::{ConnectedEntry, Route, RoutingPlan, RoutingTable};
use crate::config::RoutingMode;
use crate::error::UnreachableError;
use crate::ip::AddressPlan;
use crate::topology::{Adjacency, RouterGraph, Segment, Topology};

/// Computes per-router static routing tables
#[derive(Debug, Clone)]
pub struct RoutePlanner {
    mode: RoutingMode,
    strict: bool,
    route_point_to_point: bool,
}

impl RoutePlanner {
    pub fn new(mode: RoutingMode) -> Self {
        Self {
            mode,
            strict: true,
            route_point_to_point: false,
        }
    }

    /// In strict mode the first unreachable pair aborts planning; otherwise
    /// it is recorded as a gap
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Also install routes towards point-to-point link subnets
    pub fn route_point_to_point(mut self, enabled: bool) -> Self {
        self.route_point_to_point = enabled;
        self
    }

    pub fn compute_routes(&self, topology: &Topology, addresses: &AddressPlan) -> Result<RoutingPlan, UnreachableError> {
        let mut tables: BTreeMap<String, RoutingTable> = topology
            .routers()
            .map(|r| (r.to_string(), Self::connected_table(topology, addresses, r)))
            .collect();

        if !self.mode.forwards() {
            info!("Routing mode LocalOnly: {} router(s), connected subnets only", tables.len());
            return Ok(RoutingPlan::new(self.mode, tables, Vec::new()));
        }

        let graph = topology.router_graph();

        // Owners and BFS distances per destination segment, in declaration order.
        // A host cabled straight to a router makes its link a destination too.
        let destinations: Vec<(&Segment, Vec<&str>, BTreeMap<String, usize>)> = topology
            .segments()
            .iter()
            .filter(|s| s.is_lan() || self.route_point_to_point || topology.hosts_on(s.id).next().is_some())
            .filter_map(|segment| {
                let mut owners: Vec<&str> = topology.routers_on(segment.id).map(|i| i.node.as_str()).collect();
                owners.sort();
                owners.dedup();
                if owners.is_empty() {
                    return None;
                }
                let dist = graph.distances_from(&owners);
                Some((segment, owners, dist))
            })
            .collect();

        let mut gaps = Vec::new();

        for (router, table) in tables.iter_mut() {
            for (segment, owners, dist) in &destinations {
                if owners.contains(&router.as_str()) {
                    continue;
                }
                let subnet = addresses.subnet(segment.id).cidr;

                let Some(&distance) = dist.get(router.as_str()) else {
                    let gap = UnreachableError {
                        from: router.clone(),
                        to: owners[0].to_string(),
                        subnet,
                    };
                    if self.strict {
                        return Err(gap);
                    }
                    warn!("{}; recording gap", gap);
                    gaps.push(gap);
                    continue;
                };

                let Some(hop) = closer_neighbor(graph, router, dist, distance) else {
                    warn!(
                        "{}: no neighbor is closer to {} than {} hop(s); route skipped",
                        router, subnet, distance
                    );
                    continue;
                };
                let Some(next_hop) = addresses.interface(&hop.remote) else {
                    warn!(
                        "{}: next hop interface {} towards {} has no address; route skipped",
                        router, hop.remote, subnet
                    );
                    continue;
                };

                debug!(
                    "{}: {} via {} ({}) dev {}, {} hop(s)",
                    router, subnet, next_hop.address, hop.neighbor, hop.local, distance
                );
                table.routes.push(Route {
                    destination: subnet,
                    next_hop: next_hop.address,
                    egress: hop.local.clone(),
                    via: hop.neighbor.clone(),
                    hops: distance,
                });
            }
            table.routes.sort_by(|a, b| a.destination.cmp(&b.destination));
        }

        let plan = RoutingPlan::new(self.mode, tables, gaps);
        info!(
            "Routing mode FullMesh: {} route(s) across {} router(s), {} gap(s)",
            plan.route_count(),
            plan.tables().count(),
            plan.gaps().len()
        );
        Ok(plan)
    }

    fn connected_table(topology: &Topology, addresses: &AddressPlan, router: &str) -> RoutingTable {
        let mut table = RoutingTable::new(router);
        for segment in topology.attached_segments(router) {
            let subnet = addresses.subnet(segment);
            // Prefer the router's first interface on the segment
            if let Some(member) = subnet.members.iter().find(|m| m.interface.node == router) {
                table.connected.push(ConnectedEntry {
                    subnet: subnet.cidr,
                    interface: member.interface.clone(),
                    address: member.address,
                });
            }
        }
        table
    }
}

/// The neighbor one hop closer to the destination.
///
/// Neighbors are sorted by name, so the first match is the tie-break winner.
fn closer_neighbor<'g>(
    graph: &'g RouterGraph,
    router: &str,
    dist: &BTreeMap<String, usize>,
    distance: usize,
) -> Option<&'g Adjacency> {
    graph
        .neighbors(router)
        .iter()
        .find(|adj| dist.get(&adj.neighbor).map_or(false, |&d| d + 1 == distance))
}
