//! CIDR block allocation from address pools.
//!
//! Allocates non-overlapping blocks first-fit from an ordered list of pools.
//! Allocated blocks are kept in a `BTreeMap` keyed by network address so gap
//! detection is a single ordered walk.

use ipnet::Ipv4Net;
use log::debug;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::AllocationError;

/// One address pool and the blocks already carved from it
#[derive(Debug, Clone)]
struct Pool {
    cidr: Ipv4Net,
    allocated: BTreeMap<u32, Ipv4Net>,
}

impl Pool {
    fn new(cidr: Ipv4Net) -> Self {
        Self {
            cidr: cidr.trunc(),
            allocated: BTreeMap::new(),
        }
    }

    fn contains_block(&self, block: &Ipv4Net) -> bool {
        self.cidr.contains(&block.network()) && self.cidr.contains(&block.broadcast())
    }

    /// First allocated block overlapping `block`, if any
    fn overlapping(&self, block: &Ipv4Net) -> Option<Ipv4Net> {
        self.allocated.values().copied().find(|existing| blocks_overlap(existing, block))
    }

    /// Find the first aligned gap that can hold a block of `prefix_len`
    fn find_gap(&self, prefix_len: u8) -> Option<Ipv4Net> {
        if prefix_len < self.cidr.prefix_len() {
            return None;
        }

        // Work in u64 so a block ending at 255.255.255.255 cannot overflow
        let block_size = 1u64 << (32 - prefix_len);
        let space_end = u64::from(u32::from(self.cidr.broadcast()));
        let mut current = u64::from(u32::from(self.cidr.network()));

        for cidr in self.allocated.values() {
            let block_start = u64::from(u32::from(cidr.network()));
            let block_end = u64::from(u32::from(cidr.broadcast()));

            let aligned = align_up(current, block_size);
            if aligned + block_size - 1 < block_start {
                return to_net(aligned, prefix_len);
            }

            current = current.max(block_end + 1);
        }

        let aligned = align_up(current, block_size);
        if aligned + block_size - 1 <= space_end {
            return to_net(aligned, prefix_len);
        }

        None
    }

    fn insert(&mut self, block: Ipv4Net) {
        self.allocated.insert(u32::from(block.network()), block);
    }
}

fn align_up(addr: u64, block_size: u64) -> u64 {
    addr.div_ceil(block_size) * block_size
}

fn to_net(addr: u64, prefix_len: u8) -> Option<Ipv4Net> {
    let addr = u32::try_from(addr).ok()?;
    Ipv4Net::new(Ipv4Addr::from(addr), prefix_len).ok()
}

/// Whether two CIDR blocks share any address
pub fn blocks_overlap(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// First-fit allocator over an ordered list of pools
#[derive(Debug, Clone)]
pub struct PoolAllocator {
    pools: Vec<Pool>,
}

impl PoolAllocator {
    pub fn new(pools: &[Ipv4Net]) -> Result<Self, AllocationError> {
        if pools.is_empty() {
            return Err(AllocationError::NoPools);
        }
        Ok(Self {
            pools: pools.iter().copied().map(Pool::new).collect(),
        })
    }

    /// Whether `cidr` names one of the declared pools
    pub fn has_pool(&self, cidr: &Ipv4Net) -> bool {
        self.pools.iter().any(|p| p.cidr == cidr.trunc())
    }

    /// Allocate a block of `prefix_len` for `segment`.
    ///
    /// Pools are tried in order unless `only` restricts the search to one of
    /// them. Returns the block and the pool it came from.
    pub fn allocate(
        &mut self,
        segment: &str,
        prefix_len: u8,
        only: Option<Ipv4Net>,
    ) -> Result<(Ipv4Net, Ipv4Net), AllocationError> {
        let only = only.map(|p| p.trunc());
        if let Some(pool) = only {
            if !self.has_pool(&pool) {
                return Err(AllocationError::UnknownPool {
                    segment: segment.to_string(),
                    pool,
                });
            }
        }

        let mut fits_somewhere = false;
        for pool in self.pools.iter_mut().filter(|p| only.map_or(true, |o| o == p.cidr)) {
            if prefix_len < pool.cidr.prefix_len() {
                continue;
            }
            fits_somewhere = true;
            if let Some(block) = pool.find_gap(prefix_len) {
                pool.insert(block);
                debug!("Allocated {} from pool {} for segment '{}'", block, pool.cidr, segment);
                return Ok((block, pool.cidr));
            }
        }

        if fits_somewhere {
            Err(AllocationError::PoolExhausted {
                segment: segment.to_string(),
                prefix_len,
            })
        } else {
            Err(AllocationError::PrefixExceedsPool {
                segment: segment.to_string(),
                prefix_len,
            })
        }
    }

    /// Reserve an exact block for `segment`; returns the pool holding it
    pub fn reserve(&mut self, segment: &str, cidr: Ipv4Net) -> Result<Ipv4Net, AllocationError> {
        let cidr = cidr.trunc();
        let pool = self
            .pools
            .iter_mut()
            .find(|p| p.contains_block(&cidr))
            .ok_or_else(|| AllocationError::OutsidePools {
                segment: segment.to_string(),
                cidr,
            })?;

        if let Some(existing) = pool.overlapping(&cidr) {
            return Err(AllocationError::Overlap {
                segment: segment.to_string(),
                cidr,
                existing,
            });
        }

        pool.insert(cidr);
        debug!("Reserved {} in pool {} for segment '{}'", cidr, pool.cidr, segment);
        Ok(pool.cidr)
    }

    /// Every block handed out so far, in address order per pool
    pub fn allocated_blocks(&self) -> Vec<Ipv4Net> {
        self.pools
            .iter()
            .flat_map(|p| p.allocated.values().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_fit_in_declaration_order() {
        let mut alloc = PoolAllocator::new(&[net("20.10.172.0/24")]).unwrap();
        let (a, _) = alloc.allocate("A", 26, None).unwrap();
        let (b, _) = alloc.allocate("B", 25, None).unwrap();
        let (c, _) = alloc.allocate("C", 27, None).unwrap();
        assert_eq!(a, net("20.10.172.0/26"));
        assert_eq!(b, net("20.10.172.128/25"));
        assert_eq!(c, net("20.10.172.64/27"));
    }

    #[test]
    fn test_gap_before_reserved_block() {
        let mut alloc = PoolAllocator::new(&[net("10.0.0.0/24")]).unwrap();
        alloc.reserve("fixed", net("10.0.0.64/26")).unwrap();
        assert_eq!(alloc.allocate("x", 26, None).unwrap().0, net("10.0.0.0/26"));
        assert_eq!(alloc.allocate("y", 25, None).unwrap().0, net("10.0.0.128/25"));
        assert!(matches!(
            alloc.allocate("z", 30, None),
            Err(AllocationError::PoolExhausted { .. })
        ));
    }

    #[test]
    fn test_prefix_larger_than_pool() {
        let mut alloc = PoolAllocator::new(&[net("10.0.0.0/27")]).unwrap();
        assert_eq!(
            alloc.allocate("lan", 26, None).unwrap_err(),
            AllocationError::PrefixExceedsPool { segment: "lan".to_string(), prefix_len: 26 }
        );
    }

    #[test]
    fn test_spills_into_next_pool() {
        let mut alloc = PoolAllocator::new(&[net("10.0.0.0/30"), net("10.0.1.0/24")]).unwrap();
        let (first, pool1) = alloc.allocate("a", 30, None).unwrap();
        let (second, pool2) = alloc.allocate("b", 30, None).unwrap();
        assert_eq!(pool1, net("10.0.0.0/30"));
        assert_eq!(first, net("10.0.0.0/30"));
        assert_eq!(pool2, net("10.0.1.0/24"));
        assert_eq!(second, net("10.0.1.0/30"));
    }

    #[test]
    fn test_restricted_pool() {
        let mut alloc = PoolAllocator::new(&[net("10.0.0.0/24"), net("10.9.0.0/24")]).unwrap();
        let (block, pool) = alloc.allocate("p2p", 30, Some(net("10.9.0.0/24"))).unwrap();
        assert_eq!(pool, net("10.9.0.0/24"));
        assert_eq!(block, net("10.9.0.0/30"));
        assert!(matches!(
            alloc.allocate("p2p", 30, Some(net("192.168.0.0/24"))),
            Err(AllocationError::UnknownPool { .. })
        ));
    }

    #[test]
    fn test_reserve_conflicts() {
        let mut alloc = PoolAllocator::new(&[net("10.0.0.0/24")]).unwrap();
        alloc.reserve("a", net("10.0.0.0/25")).unwrap();
        assert!(matches!(
            alloc.reserve("b", net("10.0.0.64/26")),
            Err(AllocationError::Overlap { .. })
        ));
        assert!(matches!(
            alloc.reserve("c", net("10.0.1.0/26")),
            Err(AllocationError::OutsidePools { .. })
        ));
    }

    #[test]
    fn test_no_pools() {
        assert_eq!(PoolAllocator::new(&[]).unwrap_err(), AllocationError::NoPools);
    }

    #[test]
    fn test_allocations_never_overlap() {
        let mut alloc = PoolAllocator::new(&[net("172.16.0.0/22")]).unwrap();
        for (i, prefix) in [27u8, 24, 30, 26, 25, 30, 28].iter().enumerate() {
            alloc.allocate(&format!("s{}", i), *prefix, None).unwrap();
        }
        let blocks = alloc.allocated_blocks();
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                assert!(!blocks_overlap(a, b), "{} overlaps {}", a, b);
            }
        }
    }
}
