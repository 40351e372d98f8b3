//! The address plan produced by [`super::AddressPlanner`].

use ipnet::Ipv4Net;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::topology::{InterfaceId, SegmentId};

/// An interface and the address it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberAddress {
    pub interface: InterfaceId,
    pub address: Ipv4Addr,
}

/// The subnet assigned to one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetAssignment {
    pub segment: SegmentId,
    pub name: String,
    pub cidr: Ipv4Net,
    /// Pool the subnet was carved from
    pub pool: Ipv4Net,
    /// First usable address, present when a router is attached
    pub gateway: Option<Ipv4Addr>,
    pub members: Vec<MemberAddress>,
}

/// Address of one interface, with the subnet it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterfaceAddress {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub subnet: Ipv4Net,
    #[serde(skip)]
    pub segment: SegmentId,
}

impl InterfaceAddress {
    /// The address in `a.b.c.d/len` form
    pub fn with_prefix(&self) -> Ipv4Net {
        // prefix_len always comes from a valid subnet
        Ipv4Net::new(self.address, self.prefix_len).unwrap_or(self.subnet)
    }
}

/// Concrete addresses for every segment and interface of a topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    subnets: Vec<SubnetAssignment>,
    interfaces: BTreeMap<InterfaceId, InterfaceAddress>,
    owners: BTreeMap<Ipv4Addr, InterfaceId>,
}

impl AddressPlan {
    pub(crate) fn new(subnets: Vec<SubnetAssignment>) -> Self {
        let mut interfaces = BTreeMap::new();
        let mut owners = BTreeMap::new();

        for subnet in &subnets {
            for member in &subnet.members {
                interfaces.insert(
                    member.interface.clone(),
                    InterfaceAddress {
                        address: member.address,
                        prefix_len: subnet.cidr.prefix_len(),
                        subnet: subnet.cidr,
                        segment: subnet.segment,
                    },
                );
                owners.insert(member.address, member.interface.clone());
            }
        }

        Self {
            subnets,
            interfaces,
            owners,
        }
    }

    /// Subnets in segment order
    pub fn subnets(&self) -> &[SubnetAssignment] {
        &self.subnets
    }

    pub fn subnet(&self, segment: SegmentId) -> &SubnetAssignment {
        &self.subnets[segment.0]
    }

    pub fn interface(&self, id: &InterfaceId) -> Option<&InterfaceAddress> {
        self.interfaces.get(id)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = (&InterfaceId, &InterfaceAddress)> {
        self.interfaces.iter()
    }

    /// Reverse lookup: which interface holds `address`
    pub fn owner_of(&self, address: Ipv4Addr) -> Option<&InterfaceId> {
        self.owners.get(&address)
    }

    /// The subnet whose range holds `address`
    pub fn subnet_containing(&self, address: Ipv4Addr) -> Option<&SubnetAssignment> {
        self.subnets.iter().find(|s| s.cidr.contains(&address))
    }

    /// node -> interface -> address, for output
    pub fn report(&self) -> BTreeMap<String, BTreeMap<String, InterfaceAddress>> {
        let mut report: BTreeMap<String, BTreeMap<String, InterfaceAddress>> = BTreeMap::new();
        for (id, addr) in &self.interfaces {
            report.entry(id.node.clone()).or_default().insert(id.name.clone(), *addr);
        }
        report
    }
}
