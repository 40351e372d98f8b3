//! Plan validation utilities.
//!
//! Re-checks a finalized plan against its structural guarantees before any
//! action is emitted. A failure here means a planner bug, not bad input.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::InvariantViolation;
use crate::ip::{blocks_overlap, AddressPlan};
use crate::routing::{RoutingPlan, TraceError};

/// Validate an address plan and routing plan together
///
/// Checks for:
/// - Pairwise non-overlapping subnets
/// - Every interface address usable inside its subnet, and globally unique
/// - At most one route per destination on each router
/// - Next hops that sit on the egress interface's subnet and belong to a
///   neighbor
/// - Route chains that reach the destination without revisiting a router
pub fn validate_plan(addresses: &AddressPlan, routing: &RoutingPlan) -> Result<(), InvariantViolation> {
    check_subnets(addresses)?;
    check_addresses(addresses)?;
    check_routes(addresses, routing)?;
    debug!(
        "Plan validated: {} subnet(s), {} route(s)",
        addresses.subnets().len(),
        routing.route_count()
    );
    Ok(())
}

fn check_subnets(addresses: &AddressPlan) -> Result<(), InvariantViolation> {
    let subnets = addresses.subnets();
    for (i, a) in subnets.iter().enumerate() {
        if let Some(b) = subnets[i + 1..].iter().find(|b| blocks_overlap(&a.cidr, &b.cidr)) {
            return Err(InvariantViolation::Overlap { a: a.cidr, b: b.cidr });
        }
    }
    Ok(())
}

fn check_addresses(addresses: &AddressPlan) -> Result<(), InvariantViolation> {
    let mut seen = BTreeMap::new();
    for subnet in addresses.subnets() {
        for member in &subnet.members {
            let address = member.address;
            let usable = subnet.cidr.contains(&address)
                && address != subnet.cidr.network()
                && address != subnet.cidr.broadcast();
            if !usable {
                return Err(InvariantViolation::Containment {
                    interface: member.interface.to_string(),
                    address,
                    cidr: subnet.cidr,
                });
            }
            if let Some(first) = seen.insert(address, member.interface.to_string()) {
                return Err(InvariantViolation::DuplicateAddress {
                    address,
                    first,
                    second: member.interface.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_routes(addresses: &AddressPlan, routing: &RoutingPlan) -> Result<(), InvariantViolation> {
    for table in routing.tables() {
        let mut destinations = BTreeSet::new();
        for route in &table.routes {
            if !destinations.insert(route.destination) {
                return Err(InvariantViolation::DuplicateRoute {
                    router: table.router.clone(),
                    destination: route.destination,
                });
            }

            let dangling = || InvariantViolation::DanglingNextHop {
                router: table.router.clone(),
                destination: route.destination,
                next_hop: route.next_hop,
                egress: route.egress.to_string(),
            };
            let egress = addresses.interface(&route.egress).ok_or_else(dangling)?;
            if route.egress.node != table.router || !egress.subnet.contains(&route.next_hop) {
                return Err(dangling());
            }
            match addresses.owner_of(route.next_hop) {
                Some(owner) if owner.node == route.via && owner.node != table.router => {}
                _ => return Err(dangling()),
            }

            match routing.trace(&table.router, route.destination.network()) {
                Ok(_) => {}
                Err(TraceError::Loop { path }) => {
                    return Err(InvariantViolation::Loop {
                        router: table.router.clone(),
                        destination: route.destination,
                        path,
                    })
                }
                Err(TraceError::NoRoute { router }) | Err(TraceError::UnknownRouter(router)) => {
                    return Err(InvariantViolation::Unterminated {
                        router: table.router.clone(),
                        destination: route.destination,
                        stuck_at: router,
                    })
                }
            }
        }
    }
    Ok(())
}
