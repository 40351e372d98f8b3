//! IP address allocation and management module.
//!
//! This module carves non-overlapping subnets out of the configured address
//! pools and assigns deterministic gateway and host addresses inside them.

pub mod pool;
pub mod registry;
pub mod plan;
pub mod planner;

// Re-export commonly used types
pub use pool::{blocks_overlap, PoolAllocator};
pub use registry::{smallest_prefix_for, usable_count, SubnetRegistry};
pub use plan::{AddressPlan, InterfaceAddress, MemberAddress, SubnetAssignment};
pub use planner::AddressPlanner;
