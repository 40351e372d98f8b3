use crate::config::{Config, RoutingMode};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file {:?}", config_path))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file {:?}", config_path))?;

    info!(
        "Parsed {} node(s), {} link(s), {} pool(s)",
        config.nodes.len(),
        config.links.len(),
        config.pools.len()
    );

    config.validate()?;

    Ok(config)
}

/// CLI arguments that override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub mode: Option<RoutingMode>,
    /// Record unreachable router pairs instead of failing
    pub lenient: bool,
}

/// Apply CLI overrides to a loaded configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(mode) = overrides.mode {
        info!("Routing mode override: {:?}", mode);
        config.general.mode = mode;
    }

    if overrides.lenient && config.general.strict {
        info!("Lenient planning requested: unreachable router pairs will be recorded as gaps");
        config.general.strict = false;
    }

    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
general:
  mode: LocalOnly
pools:
  - 10.0.0.0/24
nodes:
  - { name: r1, kind: router }
  - { name: s1, kind: switch }
  - { name: h1, kind: host }
links:
  - { a: r1, b: s1 }
  - { a: h1, b: s1 }
"#;

    #[test]
    fn test_load_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.mode, RoutingMode::LocalOnly);
        assert_eq!(config.nodes.len(), 3);
        assert!(config.general.strict);
    }

    #[test]
    fn test_apply_overrides() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML).unwrap();
        let mut config = load_config(temp_file.path()).unwrap();

        let overrides = CliOverrides {
            mode: Some(RoutingMode::FullMesh),
            lenient: true,
        };
        apply_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.general.mode, RoutingMode::FullMesh);
        assert!(!config.general.strict);
    }

    #[test]
    fn test_missing_file_and_bad_yaml() {
        assert!(load_config(Path::new("/nonexistent/routeplan.yaml")).is_err());

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "pools: [not-a-cidr]\nnodes: []\nlinks: []\n").unwrap();
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "pools: []\nnodes: []\nlinks: []\n").unwrap();
        let err = load_config(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("pool"));
    }
}
