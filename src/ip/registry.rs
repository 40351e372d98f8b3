//! Per-subnet address registry.
//!
//! Tracks which usable addresses of one subnet are taken and by whom, so that
//! every member interface gets a unique address strictly inside the subnet.

use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Number of usable host addresses in a subnet of `prefix_len` (network and
/// broadcast excluded)
pub fn usable_count(prefix_len: u8) -> usize {
    if prefix_len >= 31 {
        return 0;
    }
    (1usize << (32 - prefix_len)) - 2
}

/// Largest prefix (smallest subnet, at most /30) with room for `needed` addresses
pub fn smallest_prefix_for(needed: usize) -> Option<u8> {
    (1..=30u8).rev().find(|&p| usable_count(p) >= needed.max(1))
}

/// Address registry for a single subnet
#[derive(Debug, Clone)]
pub struct SubnetRegistry {
    cidr: Ipv4Net,
    /// Address -> owner label
    assigned: BTreeMap<Ipv4Addr, String>,
    /// Next candidate for sequential assignment
    cursor: u32,
}

impl SubnetRegistry {
    pub fn new(cidr: Ipv4Net) -> Self {
        let cidr = cidr.trunc();
        Self {
            cidr,
            assigned: BTreeMap::new(),
            cursor: u32::from(cidr.network()).saturating_add(1),
        }
    }

    pub fn cidr(&self) -> Ipv4Net {
        self.cidr
    }

    /// The first usable address: the gateway slot
    pub fn first_usable(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.cidr.network()).saturating_add(1))
    }

    /// Whether `address` is a usable host address of this subnet
    pub fn is_usable(&self, address: Ipv4Addr) -> bool {
        self.cidr.contains(&address) && address != self.cidr.network() && address != self.cidr.broadcast()
    }

    /// Register a specific address. On conflict the existing owner is returned.
    pub fn register(&mut self, address: Ipv4Addr, owner: &str) -> Result<(), String> {
        match self.assigned.get(&address) {
            Some(existing) if existing != owner => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                self.assigned.insert(address, owner.to_string());
                Ok(())
            }
        }
    }

    /// Assign the lowest free usable address at or after the cursor
    pub fn assign_next(&mut self, owner: &str) -> Option<Ipv4Addr> {
        let last = u32::from(self.cidr.broadcast()).checked_sub(1)?;
        while self.cursor <= last {
            let candidate = Ipv4Addr::from(self.cursor);
            self.cursor += 1;
            if self.is_usable(candidate) && !self.assigned.contains_key(&candidate) {
                self.assigned.insert(candidate, owner.to_string());
                return Some(candidate);
            }
        }
        None
    }

    /// Get the owner of a given address
    pub fn owner_of(&self, address: Ipv4Addr) -> Option<&String> {
        self.assigned.get(&address)
    }

    pub fn assigned(&self) -> &BTreeMap<Ipv4Addr, String> {
        &self.assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_counts() {
        assert_eq!(usable_count(24), 254);
        assert_eq!(usable_count(30), 2);
        assert_eq!(usable_count(31), 0);
        assert_eq!(smallest_prefix_for(3), Some(29));
        assert_eq!(smallest_prefix_for(2), Some(30));
        assert_eq!(smallest_prefix_for(0), Some(30));
        assert_eq!(smallest_prefix_for(62), Some(26));
        assert_eq!(smallest_prefix_for(63), Some(25));
    }

    #[test]
    fn test_sequential_assignment_skips_registered() {
        let mut reg = SubnetRegistry::new("10.0.0.0/29".parse().unwrap());
        assert_eq!(reg.first_usable(), Ipv4Addr::new(10, 0, 0, 1));
        reg.register(Ipv4Addr::new(10, 0, 0, 2), "pinned").unwrap();
        assert_eq!(reg.assign_next("a"), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(reg.assign_next("b"), Some(Ipv4Addr::new(10, 0, 0, 3)));
        for _ in 0..3 {
            assert!(reg.assign_next("c").is_some());
        }
        // .7 is broadcast
        assert_eq!(reg.assign_next("d"), None);
    }

    #[test]
    fn test_register_conflict_reports_owner() {
        let mut reg = SubnetRegistry::new("10.0.0.0/24".parse().unwrap());
        reg.register(Ipv4Addr::new(10, 0, 0, 1), "r1-eth0").unwrap();
        assert!(reg.register(Ipv4Addr::new(10, 0, 0, 1), "r1-eth0").is_ok());
        assert_eq!(
            reg.register(Ipv4Addr::new(10, 0, 0, 1), "h1-eth0"),
            Err("r1-eth0".to_string())
        );
        assert_eq!(reg.owner_of(Ipv4Addr::new(10, 0, 0, 1)), Some(&"r1-eth0".to_string()));
    }

    #[test]
    fn test_network_and_broadcast_not_usable() {
        let reg = SubnetRegistry::new("10.0.0.0/30".parse().unwrap());
        assert!(!reg.is_usable(Ipv4Addr::new(10, 0, 0, 0)));
        assert!(reg.is_usable(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(reg.is_usable(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(!reg.is_usable(Ipv4Addr::new(10, 0, 0, 3)));
    }
}
