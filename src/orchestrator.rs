//! Planning orchestrator.
//!
//! This module runs the pipeline from a parsed configuration to a finished
//! plan (topology, addresses, routes, actions, oracle), writes the plan
//! artifacts, and optionally checks the plan against a live network.

use crate::config::{Config, ProbeConfig};
use crate::error::PlanError;
use crate::forwarding::{emit_actions, ActionList};
use crate::ip::{AddressPlan, AddressPlanner, InterfaceAddress, SubnetAssignment};
use crate::routing::{RoutePlanner, RoutingPlan};
use crate::topology::{Topology, TopologyBuilder};
use crate::utils::validate_plan;
use crate::verify::{build_oracle, CancelToken, Probe, ProbeRunner, ReachabilityMatrix, VerificationReport};
use color_eyre::eyre::WrapErr;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ADDRESS_PLAN_FILE: &str = "address_plan.json";
pub const ROUTING_TABLES_FILE: &str = "routing_tables.json";
pub const ACTIONS_JSON_FILE: &str = "actions.json";
pub const ACTIONS_TEXT_FILE: &str = "actions.txt";
pub const ORACLE_FILE: &str = "oracle.json";
pub const VERIFICATION_FILE: &str = "verification.json";

/// Every artifact of one planning run
#[derive(Debug, Clone)]
pub struct NetworkPlan {
    pub topology: Topology,
    pub addresses: AddressPlan,
    pub routing: RoutingPlan,
    pub actions: ActionList,
    pub oracle: ReachabilityMatrix,
}

/// Run the offline pipeline for a configuration.
///
/// Each stage consumes the immutable output of the previous one, so the same
/// configuration always produces the same plan.
pub fn plan_network(config: &Config) -> Result<NetworkPlan, PlanError> {
    config.validate()?;
    let general = config.general();

    let topology = TopologyBuilder::from_config(config)?.build(general.mode)?;
    info!(
        "Topology: {} router(s), {} host(s), {} link(s), {} segment(s), {} router adjacenc(ies)",
        topology.routers().count(),
        topology.hosts().count(),
        topology.links().len(),
        topology.segments().len(),
        topology.router_graph().edge_count()
    );

    let addresses = AddressPlanner::new(&config.pools).plan(&topology)?;

    let routing = RoutePlanner::new(topology.mode())
        .strict(general.strict)
        .route_point_to_point(general.route_point_to_point)
        .compute_routes(&topology, &addresses)?;

    validate_plan(&addresses, &routing)?;

    let actions = emit_actions(&topology, &addresses, &routing);
    let oracle = build_oracle(&topology, &addresses, &routing);

    Ok(NetworkPlan {
        topology,
        addresses,
        routing,
        actions,
        oracle,
    })
}

#[derive(Serialize)]
struct AddressPlanReport<'a> {
    subnets: &'a [SubnetAssignment],
    interfaces: BTreeMap<String, BTreeMap<String, InterfaceAddress>>,
}

/// Write the plan artifacts into `output_dir`, returning the files written
pub fn write_plan_outputs(plan: &NetworkPlan, output_dir: &Path) -> color_eyre::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .wrap_err_with(|| format!("Failed to create output directory {:?}", output_dir))?;

    let address_report = AddressPlanReport {
        subnets: plan.addresses.subnets(),
        interfaces: plan.addresses.report(),
    };

    let mut written = Vec::new();
    written.push(write_json(output_dir, ADDRESS_PLAN_FILE, &address_report)?);
    written.push(write_json(output_dir, ROUTING_TABLES_FILE, &plan.routing)?);
    written.push(write_json(output_dir, ACTIONS_JSON_FILE, &plan.actions)?);
    written.push(write_text(output_dir, ACTIONS_TEXT_FILE, &plan.actions.render())?);
    written.push(write_json(output_dir, ORACLE_FILE, &plan.oracle)?);

    info!(
        "Wrote {} plan file(s) with {} action(s) to {:?}",
        written.len(),
        plan.actions.len(),
        output_dir
    );
    Ok(written)
}

/// Probe a live network against the plan's oracle and record the report
pub fn verify_plan(
    plan: &NetworkPlan,
    probe_config: &ProbeConfig,
    probe: &dyn Probe,
    cancel: &CancelToken,
    output_dir: &Path,
) -> color_eyre::Result<VerificationReport> {
    let report = ProbeRunner::from(probe_config)
        .run(&plan.oracle, probe, cancel)
        .wrap_err("Failed to start the probe worker pool")?;
    write_json(output_dir, VERIFICATION_FILE, &report)?;
    Ok(report)
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> color_eyre::Result<PathBuf> {
    let json = serde_json::to_string_pretty(value).wrap_err_with(|| format!("Failed to serialize {}", name))?;
    write_text(dir, name, &json)
}

fn write_text(dir: &Path, name: &str, content: &str) -> color_eyre::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content).wrap_err_with(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}
