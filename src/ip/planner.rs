//! IP address planning.
//!
//! Carves one subnet per segment out of the address pools and hands out
//! interface addresses inside each subnet. Everything happens in declaration
//! order so an unchanged topology always yields the same plan.

use ipnet::Ipv4Net;
use log::{debug, info, warn};

use super::plan::{AddressPlan, MemberAddress, SubnetAssignment};
use super::pool::PoolAllocator;
use super::registry::{smallest_prefix_for, usable_count, SubnetRegistry};
use crate::error::AllocationError;
use crate::topology::{InterfaceId, Segment, Topology};

/// Sizing decided for a segment before any block is carved
#[derive(Debug, Clone)]
struct SegmentNeeds {
    prefix_len: u8,
    /// Exact subnet, from segment requirements or pinned host addresses
    fixed: Option<Ipv4Net>,
    pool: Option<Ipv4Net>,
}

/// Allocates subnets and interface addresses for a topology
#[derive(Debug, Clone)]
pub struct AddressPlanner {
    pools: Vec<Ipv4Net>,
}

impl AddressPlanner {
    pub fn new(pools: &[Ipv4Net]) -> Self {
        Self {
            pools: pools.to_vec(),
        }
    }

    /// Produce the address plan.
    ///
    /// Pinned subnets are reserved first, then every other segment is
    /// allocated first-fit in declaration order. Within a subnet the first
    /// router takes the first usable address (the gateway), further routers
    /// follow, then hosts in attachment order.
    pub fn plan(&self, topology: &Topology) -> Result<AddressPlan, AllocationError> {
        let mut allocator = PoolAllocator::new(&self.pools)?;

        let needs = topology
            .segments()
            .iter()
            .map(|segment| self.segment_needs(topology, segment))
            .collect::<Result<Vec<_>, _>>()?;

        let mut blocks: Vec<Option<(Ipv4Net, Ipv4Net)>> = vec![None; needs.len()];

        for (segment, need) in topology.segments().iter().zip(&needs) {
            if let Some(cidr) = need.fixed {
                let pool = allocator.reserve(&segment.name, cidr)?;
                blocks[segment.id.0] = Some((cidr, pool));
            }
        }

        for (segment, need) in topology.segments().iter().zip(&needs) {
            if need.fixed.is_none() {
                let block = allocator.allocate(&segment.name, need.prefix_len, need.pool)?;
                blocks[segment.id.0] = Some(block);
            }
        }

        debug!("Allocated blocks: {:?}", allocator.allocated_blocks());

        let mut subnets = Vec::with_capacity(blocks.len());
        for (segment, block) in topology.segments().iter().zip(blocks) {
            let Some((cidr, pool)) = block else {
                // every segment was either reserved or allocated above
                continue;
            };
            subnets.push(Self::assign_members(topology, segment, cidr, pool)?);
        }

        info!(
            "Address plan: {} subnets, {} interfaces from {} pool(s)",
            subnets.len(),
            subnets.iter().map(|s| s.members.len()).sum::<usize>(),
            self.pools.len()
        );

        Ok(AddressPlan::new(subnets))
    }

    fn segment_needs(&self, topology: &Topology, segment: &Segment) -> Result<SegmentNeeds, AllocationError> {
        let req = &segment.requirements;
        let routers = topology.routers_on(segment.id).count();
        let hosts = topology.hosts_on(segment.id).count();
        let required = hosts
            .max(req.host_count.unwrap_or(0))
            .checked_add(routers)
            .ok_or_else(|| AllocationError::SegmentTooLarge {
                segment: segment.name.clone(),
                required: usize::MAX,
            })?;

        let mut fixed = req.cidr.map(|c| c.trunc());
        for host in topology.hosts_on(segment.id) {
            let Some(pin) = topology.node(&host.node).and_then(|n| n.address) else {
                continue;
            };
            match fixed {
                None => fixed = Some(pin.trunc()),
                Some(cidr) if cidr != pin.trunc() => {
                    return Err(AllocationError::PinOutsideSubnet {
                        host: host.node.clone(),
                        address: pin,
                        segment: segment.name.clone(),
                        cidr,
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(cidr) = fixed {
            Self::check_pinned(segment, cidr)?;
        }

        let prefix_len = match (fixed, req.prefix_len) {
            (Some(cidr), _) => cidr.prefix_len(),
            (None, Some(p)) => p,
            (None, None) => smallest_prefix_for(required).ok_or_else(|| AllocationError::SegmentTooLarge {
                segment: segment.name.clone(),
                required,
            })?,
        };

        if !(1..=30).contains(&prefix_len) {
            return Err(AllocationError::InvalidPrefix {
                segment: segment.name.clone(),
                prefix_len,
            });
        }

        let usable = usable_count(prefix_len);
        if usable < required {
            return Err(AllocationError::PrefixTooSmall {
                segment: segment.name.clone(),
                prefix_len,
                required,
                usable,
            });
        }

        debug!(
            "Segment '{}': {} router(s), {} address(es) required, /{}{}",
            segment.name,
            routers,
            required,
            prefix_len,
            if fixed.is_some() { " (pinned)" } else { "" }
        );

        Ok(SegmentNeeds {
            prefix_len,
            fixed,
            pool: req.pool,
        })
    }

    /// A pinned subnet must agree with the sizing and pool declared for its segment
    fn check_pinned(segment: &Segment, cidr: Ipv4Net) -> Result<(), AllocationError> {
        let req = &segment.requirements;
        if let Some(pool) = req.pool {
            if !pool.trunc().contains(&cidr) {
                return Err(AllocationError::PinnedOutsidePool {
                    segment: segment.name.clone(),
                    cidr,
                    pool,
                });
            }
        }
        match req.prefix_len {
            Some(p) if p != cidr.prefix_len() && segment.is_lan() => Err(AllocationError::PinnedPrefixMismatch {
                segment: segment.name.clone(),
                cidr,
                prefix_len: p,
            }),
            // point-to-point prefixes are a global default, so a pinned host wins
            Some(p) if p != cidr.prefix_len() => {
                warn!(
                    "Segment '{}': pinned subnet {} overrides the point-to-point /{}",
                    segment.name, cidr, p
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn assign_members(
        topology: &Topology,
        segment: &Segment,
        cidr: Ipv4Net,
        pool: Ipv4Net,
    ) -> Result<SubnetAssignment, AllocationError> {
        let mut registry = SubnetRegistry::new(cidr);
        let conflict = |address, first: String, second: &InterfaceId| AllocationError::AddressConflict {
            segment: segment.name.clone(),
            address,
            first,
            second: second.to_string(),
        };

        // Pinned host addresses are claimed before anything else
        for host in topology.hosts_on(segment.id) {
            if let Some(pin) = topology.node(&host.node).and_then(|n| n.address) {
                let address = pin.addr();
                if !registry.is_usable(address) {
                    return Err(AllocationError::PinOutsideSubnet {
                        host: host.node.clone(),
                        address: pin,
                        segment: segment.name.clone(),
                        cidr,
                    });
                }
                registry
                    .register(address, &host.to_string())
                    .map_err(|existing| conflict(address, existing, host))?;
            }
        }

        let mut gateway = None;
        for (i, router) in topology.routers_on(segment.id).enumerate() {
            if i == 0 {
                let first = registry.first_usable();
                registry
                    .register(first, &router.to_string())
                    .map_err(|existing| conflict(first, existing, router))?;
                gateway = Some(first);
            } else {
                Self::next_address(&mut registry, segment, router)?;
            }
        }

        for host in topology.hosts_on(segment.id) {
            let pinned = topology.node(&host.node).and_then(|n| n.address).is_some();
            if !pinned {
                Self::next_address(&mut registry, segment, host)?;
            }
        }

        // Members keep attachment order in the output
        let mut members = Vec::with_capacity(segment.members.len());
        for member in &segment.members {
            let label = member.to_string();
            let address = registry
                .assigned()
                .iter()
                .find(|(_, owner)| **owner == label)
                .map(|(addr, _)| *addr);
            if let Some(address) = address {
                debug!("{} -> {}/{}", member, address, cidr.prefix_len());
                members.push(MemberAddress {
                    interface: member.clone(),
                    address,
                });
            }
        }

        Ok(SubnetAssignment {
            segment: segment.id,
            name: segment.name.clone(),
            cidr,
            pool,
            gateway,
            members,
        })
    }

    fn next_address(
        registry: &mut SubnetRegistry,
        segment: &Segment,
        member: &InterfaceId,
    ) -> Result<(), AllocationError> {
        registry
            .assign_next(&member.to_string())
            .map(|_| ())
            .ok_or_else(|| AllocationError::PrefixTooSmall {
                segment: segment.name.clone(),
                prefix_len: registry.cidr().prefix_len(),
                required: segment.members.len(),
                usable: usable_count(registry.cidr().prefix_len()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{EndpointSpec, NodeKind, RoutingMode, SegmentRequirements, TopologyBuilder};
    use std::net::Ipv4Addr;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn one_lan(host_pin: Option<Ipv4Net>, req: SegmentRequirements) -> Topology {
        let mut b = TopologyBuilder::new();
        b.add_node("r1", NodeKind::Router)
            .add_node("s1", NodeKind::Switch)
            .add_node("h1", NodeKind::Host)
            .add_node_with_address("h2", NodeKind::Host, host_pin)
            .add_link(EndpointSpec::node("h1"), EndpointSpec::node("s1"))
            .add_link(EndpointSpec::node("h2"), EndpointSpec::node("s1"))
            .add_link(EndpointSpec::node("r1"), EndpointSpec::node("s1"))
            .segment_requirements("s1", req);
        b.build(RoutingMode::FullMesh).unwrap()
    }

    #[test]
    fn test_gateway_then_hosts() {
        let topo = one_lan(None, SegmentRequirements::default());
        let plan = AddressPlanner::new(&[net("10.0.0.0/24")]).plan(&topo).unwrap();
        let lan = &plan.subnets()[0];
        // 1 router + 2 hosts fit in a /29
        assert_eq!(lan.cidr, net("10.0.0.0/29"));
        assert_eq!(lan.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
        let r1 = plan.interface(&InterfaceId::new("r1", "eth0")).unwrap();
        let h1 = plan.interface(&InterfaceId::new("h1", "eth0")).unwrap();
        let h2 = plan.interface(&InterfaceId::new("h2", "eth0")).unwrap();
        assert_eq!(r1.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(h1.address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(h2.address, Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(h2.with_prefix(), net("10.0.0.3/29"));
        // attachment order preserved
        assert_eq!(lan.members[0].interface, InterfaceId::new("h1", "eth0"));
    }

    #[test]
    fn test_declared_host_count_widens_subnet() {
        let req = SegmentRequirements {
            host_count: Some(40),
            ..Default::default()
        };
        let plan = AddressPlanner::new(&[net("10.0.0.0/24")])
            .plan(&one_lan(None, req))
            .unwrap();
        assert_eq!(plan.subnets()[0].cidr.prefix_len(), 26);
    }

    #[test]
    fn test_prefix_too_small() {
        let req = SegmentRequirements {
            prefix_len: Some(30),
            ..Default::default()
        };
        let err = AddressPlanner::new(&[net("10.0.0.0/24")])
            .plan(&one_lan(None, req))
            .unwrap_err();
        assert!(matches!(err, AllocationError::PrefixTooSmall { required: 3, usable: 2, .. }));
    }

    #[test]
    fn test_pool_too_small_for_prefix() {
        let req = SegmentRequirements {
            prefix_len: Some(26),
            ..Default::default()
        };
        let err = AddressPlanner::new(&[net("10.0.0.0/27")])
            .plan(&one_lan(None, req))
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::PrefixExceedsPool { segment: "s1".to_string(), prefix_len: 26 }
        );
    }

    #[test]
    fn test_pinned_host_defines_subnet() {
        let topo = one_lan(Some(net("10.0.0.200/26")), SegmentRequirements::default());
        let plan = AddressPlanner::new(&[net("10.0.0.0/24")]).plan(&topo).unwrap();
        let lan = &plan.subnets()[0];
        assert_eq!(lan.cidr, net("10.0.0.192/26"));
        assert_eq!(lan.gateway, Some(Ipv4Addr::new(10, 0, 0, 193)));
        let h1 = plan.interface(&InterfaceId::new("h1", "eth0")).unwrap();
        let h2 = plan.interface(&InterfaceId::new("h2", "eth0")).unwrap();
        assert_eq!(h1.address, Ipv4Addr::new(10, 0, 0, 194));
        assert_eq!(h2.address, Ipv4Addr::new(10, 0, 0, 200));
    }

    #[test]
    fn test_pin_on_gateway_conflicts() {
        let topo = one_lan(Some(net("10.0.0.1/24")), SegmentRequirements::default());
        let err = AddressPlanner::new(&[net("10.0.0.0/24")]).plan(&topo).unwrap_err();
        assert!(matches!(err, AllocationError::AddressConflict { .. }));
    }

    #[test]
    fn test_pin_disagreeing_with_fixed_cidr() {
        let req = SegmentRequirements {
            cidr: Some(net("10.0.0.0/25")),
            ..Default::default()
        };
        let topo = one_lan(Some(net("10.0.0.200/25")), req);
        let err = AddressPlanner::new(&[net("10.0.0.0/24")]).plan(&topo).unwrap_err();
        assert!(matches!(err, AllocationError::PinOutsideSubnet { .. }));
    }

    #[test]
    fn test_host_count_overflow_is_rejected() {
        let req = SegmentRequirements {
            host_count: Some(usize::MAX),
            ..Default::default()
        };
        let err = AddressPlanner::new(&[net("10.0.0.0/24")])
            .plan(&one_lan(None, req))
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::SegmentTooLarge { segment: "s1".to_string(), required: usize::MAX }
        );
    }

    #[test]
    fn test_pinned_cidr_must_match_declared_prefix() {
        let req = SegmentRequirements {
            cidr: Some(net("10.0.0.0/25")),
            prefix_len: Some(27),
            ..Default::default()
        };
        let err = AddressPlanner::new(&[net("10.0.0.0/24")])
            .plan(&one_lan(None, req))
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::PinnedPrefixMismatch {
                segment: "s1".to_string(),
                cidr: net("10.0.0.0/25"),
                prefix_len: 27,
            }
        );
    }

    #[test]
    fn test_pinned_host_must_sit_in_declared_pool() {
        let req = SegmentRequirements {
            pool: Some(net("10.1.0.0/24")),
            ..Default::default()
        };
        let topo = one_lan(Some(net("10.0.0.200/26")), req);
        let err = AddressPlanner::new(&[net("10.0.0.0/24"), net("10.1.0.0/24")])
            .plan(&topo)
            .unwrap_err();
        assert!(matches!(err, AllocationError::PinnedOutsidePool { pool, .. } if pool == net("10.1.0.0/24")));
    }

    #[test]
    fn test_pinned_cidr_agreeing_with_requirements() {
        let req = SegmentRequirements {
            cidr: Some(net("10.1.0.64/26")),
            prefix_len: Some(26),
            pool: Some(net("10.1.0.0/24")),
            ..Default::default()
        };
        let plan = AddressPlanner::new(&[net("10.0.0.0/24"), net("10.1.0.0/24")])
            .plan(&one_lan(None, req))
            .unwrap();
        assert_eq!(plan.subnets()[0].cidr, net("10.1.0.64/26"));
        assert_eq!(plan.subnets()[0].pool, net("10.1.0.0/24"));
    }

    #[test]
    fn test_replanning_is_identical() {
        let topo = one_lan(None, SegmentRequirements::default());
        let planner = AddressPlanner::new(&[net("10.0.0.0/24")]);
        let first = planner.plan(&topo).unwrap();
        let second = planner.plan(&topo).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.report()).unwrap(),
            serde_json::to_string(&second.report()).unwrap()
        );
    }

    #[test]
    fn test_reverse_lookup() {
        let topo = one_lan(None, SegmentRequirements::default());
        let plan = AddressPlanner::new(&[net("10.0.0.0/24")]).plan(&topo).unwrap();
        assert_eq!(
            plan.owner_of(Ipv4Addr::new(10, 0, 0, 1)),
            Some(&InterfaceId::new("r1", "eth0"))
        );
        assert!(plan.subnet_containing(Ipv4Addr::new(10, 0, 0, 5)).is_some());
        assert!(plan.subnet_containing(Ipv4Addr::new(10, 0, 0, 9)).is_none());
        assert_eq!(plan.report()["h1"]["eth0"].address, Ipv4Addr::new(10, 0, 0, 2));
    }
}
