use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;

use routeplan::config::RoutingMode;
use routeplan::config_loader::{self, CliOverrides};
use routeplan::orchestrator;
use routeplan::verify::{CancelToken, CommandProbe, ProbeOutcome};

/// Addressing and static-route compiler for emulated networks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for the plan files
    #[arg(short, long, default_value = "plan_output")]
    output: PathBuf,

    /// Override the routing mode from the configuration
    #[arg(long, value_enum)]
    mode: Option<RoutingMode>,

    /// Record unreachable router pairs as gaps instead of failing
    #[arg(long)]
    lenient: bool,

    /// Probe the live network with the configured probe command after planning
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Load before logging so the configured level can act as the default filter
    let mut config = config_loader::load_config(&args.config)?;
    let level = config.general.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!("Starting routeplan");
    info!("Configuration file: {:?}", args.config);
    info!("Output directory: {:?}", args.output);

    let overrides = CliOverrides {
        mode: args.mode,
        lenient: args.lenient,
    };
    config_loader::apply_overrides(&mut config, &overrides)?;

    let plan = orchestrator::plan_network(&config).wrap_err("Planning failed")?;
    if !plan.routing.gaps().is_empty() {
        warn!(
            "{} unreachable router pair(s) recorded; affected host pairs are marked unreachable",
            plan.routing.gaps().len()
        );
    }

    if plan.actions.is_empty() {
        warn!("The plan contains no configuration actions");
    }

    orchestrator::write_plan_outputs(&plan, &args.output)?;
    info!("Apply {:?} with your executor", args.output.join(orchestrator::ACTIONS_TEXT_FILE));

    if args.verify {
        let command = config
            .probe
            .command
            .clone()
            .ok_or_else(|| eyre!("--verify requires probe.command in the configuration"))?;
        let probe = CommandProbe::new(command);
        let report = orchestrator::verify_plan(&plan, &config.probe, &probe, &CancelToken::new(), &args.output)?;

        for result in report.failures() {
            match &result.outcome {
                ProbeOutcome::TimedOut { error } => error!("{}", error),
                other => error!("{} -> {}: expected {:?}, got {:?}", result.source, result.target, result.expected, other),
            }
        }
        if !report.passed() {
            return Err(eyre!(
                "Verification failed: {} of {} probe(s) did not match the plan",
                report.failures().count(),
                report.results.len()
            ));
        }
        info!("Verification passed");
    }

    info!("Planning completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["routeplan", "--config", "net.yaml"]);

        assert_eq!(args.config, PathBuf::from("net.yaml"));
        assert_eq!(args.output, PathBuf::from("plan_output"));
        assert_eq!(args.mode, None);
        assert!(!args.lenient);
        assert!(!args.verify);
    }

    #[test]
    fn test_override_args() {
        let args = Args::parse_from([
            "routeplan",
            "-c",
            "net.yaml",
            "-o",
            "out",
            "--mode",
            "local-only",
            "--lenient",
            "--verify",
        ]);

        assert_eq!(args.mode, Some(RoutingMode::LocalOnly));
        assert_eq!(args.output, PathBuf::from("out"));
        assert!(args.lenient);
        assert!(args.verify);
    }
}
