//! Turns a finalized plan into an ordered action list.

use log::info;

use super::actions::{ActionList, ConfigAction};
use crate::ip::AddressPlan;
use crate::routing::RoutingPlan;
use crate::topology::Topology;

/// Emit configuration actions for a plan.
///
/// Order is fixed: interface addresses, forwarding toggles, static routes,
/// host default routes. Nodes appear by name within each phase and routes by
/// destination, so an unchanged plan always emits the same sequence.
pub fn emit_actions(topology: &Topology, addresses: &AddressPlan, routing: &RoutingPlan) -> ActionList {
    let mut actions = Vec::new();

    for (id, addr) in addresses.interfaces() {
        actions.push(ConfigAction::AssignAddress {
            node: id.node.clone(),
            interface: id.to_string(),
            address: addr.with_prefix(),
        });
    }

    for router in topology.routers() {
        let router = router.to_string();
        actions.push(if routing.mode.forwards() {
            ConfigAction::EnableForwarding { router }
        } else {
            ConfigAction::DisableForwarding { router }
        });
    }

    for table in routing.tables() {
        for route in &table.routes {
            actions.push(ConfigAction::InstallRoute {
                router: table.router.clone(),
                destination: route.destination,
                next_hop: route.next_hop,
                egress: route.egress.to_string(),
            });
        }
    }

    for host in topology.hosts() {
        let Some(interface) = topology.host_interface(host) else {
            continue;
        };
        let Some(segment) = topology.segment_of(&interface) else {
            continue;
        };
        if let Some(gateway) = addresses.subnet(segment).gateway {
            actions.push(ConfigAction::SetDefaultRoute {
                host: host.to_string(),
                gateway,
                egress: interface.to_string(),
            });
        }
    }

    info!("Emitted {} configuration action(s)", actions.len());
    ActionList { actions }
}
