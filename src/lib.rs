//! # Routeplan - Addressing and static-route compiler for emulated networks
//!
//! This library turns a declarative description of hosts, routers, switches
//! and links into a complete, deterministic network plan: non-overlapping
//! subnets, per-interface addresses, per-router static routing tables, an
//! ordered list of configuration actions, and the host-to-host reachability
//! the plan is expected to deliver.
//!
//! ## Overview
//!
//! Planning is a pure, offline pipeline. Each stage consumes the immutable
//! output of the previous one:
//!
//! ```text
//! Config -> Topology -> AddressPlan -> RoutingPlan -> ActionList
//!                                                 \-> ReachabilityMatrix
//! ```
//!
//! The same configuration always yields byte-identical output. Applying the
//! actions to a live network is left to an external executor; the optional
//! verification phase then probes that network against the oracle.
//!
//! ## Key Features
//!
//! - **Deterministic addressing**: first-fit subnet allocation in declaration order
//! - **Shortest-path static routes**: BFS with a lexicographic tie-break, loop-free by construction
//! - **Two routing modes**: `FullMesh` (every host reaches every host) or `LocalOnly`
//! - **Self-checking plans**: overlap, containment, next-hop and loop checks before emission
//! - **Live verification**: bounded parallel probes with timeouts, retries and cancellation
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: Type-safe configuration structures and validation
//! - `config_loader`: Configuration file loading and CLI overrides
//! - `error`: Error taxonomy of the planning pipeline
//! - `topology`: Nodes, links, segments and the router adjacency graph
//! - `ip`: Subnet allocation and interface address assignment
//! - `routing`: Static route computation and route lookup
//! - `forwarding`: Configuration action emission
//! - `verify`: Reachability oracle and live probe runner
//! - `utils`: Plan validation
//! - `orchestrator`: High-level orchestration of the pipeline
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use routeplan::{config_loader, orchestrator};
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("network.yaml"))?;
//! let plan = orchestrator::plan_network(&config)?;
//! orchestrator::write_plan_outputs(&plan, Path::new("plan_output"))?;
//!
//! // plan_output now contains address_plan.json, routing_tables.json,
//! // actions.json, actions.txt and oracle.json
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   mode: FullMesh        # or LocalOnly
//!   strict: true          # fail on unreachable router pairs
//!
//! pools:
//!   - 20.10.172.0/24
//!   - 20.10.100.0/24
//!
//! nodes:
//!   - { name: rA, kind: router }
//!   - { name: sA, kind: switch }
//!   - { name: hA1, kind: host }
//!
//! links:
//!   - { a: rA, b: sA }
//!   - { a: hA1, b: sA }
//!
//! segments:
//!   - { switch: sA, prefix_len: 26 }
//!
//! point_to_point:
//!   prefix_len: 30
//!   pool: 20.10.100.0/24
//!
//! probe:
//!   workers: 4
//!   timeout: 2s
//!   command: "ip netns exec {source} ping -c1 -W{timeout} {target_ip}"
//! ```

pub mod config;
pub mod config_loader;
pub mod error;
pub mod forwarding;
pub mod ip;
pub mod orchestrator;
pub mod routing;
pub mod topology;
pub mod utils;
pub mod verify;

pub use config::{Config, RoutingMode};
pub use error::{AllocationError, InvariantViolation, PlanError, ProbeTimeout, TopologyError, UnreachableError};
pub use orchestrator::{plan_network, NetworkPlan};
