//! Static routing module.
//!
//! Computes per-router routing tables from the router graph and the address
//! plan, and resolves destinations hop by hop against those tables.

pub mod table;
pub mod planner;

pub use crate::config::RoutingMode;
pub use table::{ConnectedEntry, Lookup, Route, RoutingPlan, RoutingTable, TraceError};
pub use planner::RoutePlanner;
