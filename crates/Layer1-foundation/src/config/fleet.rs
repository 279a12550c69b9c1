//! AppConfig - immutable settings for one fleet run
//!
//! Loading order:
//! 1. Built-in defaults
//! 2. Config file (`--config <path>` or `<config_dir>/fleet/fleet.json`)
//! 3. Command-line overrides

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Global config file name
pub const FLEET_CONFIG_FILE: &str = "fleet.json";

/// Settings for one fleet run
///
/// Read-only once a workflow has been constructed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Dockerfile name, relative to `build_context`
    pub dockerfile: String,

    /// Directory passed to the image build
    pub build_context: PathBuf,

    /// Image reference containers are created from
    pub image_name: String,

    /// Port the worker listens on inside each container
    pub exposed_port: u16,

    /// Fleet size
    pub requested_live_containers: usize,

    /// Host port of the first container; the rest follow contiguously
    pub starting_host_port: u16,

    /// Engine state string that counts as live
    pub running_state: String,

    /// Aggregated container log file
    pub log_filename: String,

    /// Stats report file
    pub stats_filename: String,

    /// Copy emitted stats reports to the stats file
    pub stats_persist: bool,

    /// Emit stats reports at all
    pub stats_display: bool,

    /// Emit every n-th stats snapshot
    pub throttle_stats_input_requests: u64,

    /// Ownership snapshot file name
    pub registry_filename: String,

    /// Directory holding the snapshot and sink files
    pub state_dir: PathBuf,

    /// Build the image before launching
    pub build_image: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dockerfile: "Dockerfile".to_string(),
            build_context: PathBuf::from("."),
            image_name: "mariohellowebserver:latest".to_string(),
            exposed_port: 8770,
            requested_live_containers: 2,
            starting_host_port: 8770,
            running_state: "running".to_string(),
            log_filename: "containers.log".to_string(),
            stats_filename: "containers_stats.log".to_string(),
            stats_persist: true,
            stats_display: true,
            throttle_stats_input_requests: 20,
            registry_filename: "owned_containers.json".to_string(),
            state_dir: PathBuf::from("."),
            build_image: true,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the config file if any
    ///
    /// An explicit `path` must exist; the global file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let (dir, file) = split_path(path)?;
                let config = JsonStore::new(dir).load::<AppConfig>(&file)?;
                debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            None => {
                if let Ok(global) = JsonStore::global() {
                    if let Some(config) = global.load_optional::<AppConfig>(FLEET_CONFIG_FILE)? {
                        debug!(
                            "Loaded config from {}",
                            global.file_path(FLEET_CONFIG_FILE).display()
                        );
                        return Ok(config);
                    }
                }
                Ok(Self::default())
            }
        }
    }

    /// Apply command-line overrides
    pub fn merge(&mut self, overrides: ConfigOverrides) {
        if let Some(n) = overrides.requested_live_containers {
            self.requested_live_containers = n;
        }
        if let Some(port) = overrides.starting_host_port {
            self.starting_host_port = port;
        }
        if let Some(image) = overrides.image_name {
            self.image_name = image;
        }
        if let Some(port) = overrides.exposed_port {
            self.exposed_port = port;
        }
        if let Some(dockerfile) = overrides.dockerfile {
            self.dockerfile = dockerfile;
        }
        if let Some(context) = overrides.build_context {
            self.build_context = context;
        }
        if let Some(throttle) = overrides.throttle_stats_input_requests {
            self.throttle_stats_input_requests = throttle;
        }
        if let Some(dir) = overrides.state_dir {
            self.state_dir = dir;
        }
        if overrides.no_stats_display {
            self.stats_display = false;
        }
        if overrides.no_stats_persist {
            self.stats_persist = false;
        }
        if overrides.skip_build {
            self.build_image = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.throttle_stats_input_requests == 0 {
            return Err(Error::Validation(
                "throttleStatsInputRequests must be at least 1".to_string(),
            ));
        }
        if self.image_name.trim().is_empty() {
            return Err(Error::Validation("imageName must not be empty".to_string()));
        }
        if self.requested_live_containers > 0 && self.last_host_port().is_none() {
            return Err(Error::Validation(format!(
                "{} containers starting at port {} run past port {}",
                self.requested_live_containers,
                self.starting_host_port,
                u16::MAX
            )));
        }
        Ok(())
    }

    /// Host port of the last container, `None` if the fleet runs past `u16::MAX`
    fn last_host_port(&self) -> Option<u16> {
        let offset = self.requested_live_containers.checked_sub(1)?;
        u16::try_from(offset)
            .ok()
            .and_then(|offset| self.starting_host_port.checked_add(offset))
    }

    /// Store for the snapshot and sink files
    pub fn state_store(&self) -> JsonStore {
        JsonStore::new(&self.state_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join(&self.log_filename)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.state_dir.join(&self.stats_filename)
    }

    pub fn stats_settings(&self) -> StatsSettings {
        StatsSettings {
            display: self.stats_display,
            persist: self.stats_persist,
            throttle: self.throttle_stats_input_requests,
        }
    }
}

fn split_path(path: &Path) -> Result<(PathBuf, String)> {
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| Error::Config(format!("Invalid config path: {}", path.display())))?
        .to_string();
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, file))
}

// ============================================================================
// ConfigOverrides
// ============================================================================

/// Values supplied on the command line; `None` keeps the loaded value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub requested_live_containers: Option<usize>,
    pub starting_host_port: Option<u16>,
    pub image_name: Option<String>,
    pub exposed_port: Option<u16>,
    pub dockerfile: Option<String>,
    pub build_context: Option<PathBuf>,
    pub throttle_stats_input_requests: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub no_stats_display: bool,
    pub no_stats_persist: bool,
    pub skip_build: bool,
}

// ============================================================================
// StatsSettings
// ============================================================================

/// The stats emission toggles, copied out of [`AppConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSettings {
    pub display: bool,
    pub persist: bool,
    pub throttle: u64,
}

impl StatsSettings {
    /// Whether the snapshot with 0-based `index` is emitted
    pub fn should_emit(&self, index: u64) -> bool {
        self.display && self.throttle > 0 && index % self.throttle == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.image_name, "mariohellowebserver:latest");
        assert_eq!(config.exposed_port, 8770);
        assert_eq!(config.starting_host_port, 8770);
        assert_eq!(config.requested_live_containers, 2);
        assert_eq!(config.throttle_stats_input_requests, 20);
        assert!(config.stats_display && config.stats_persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        std::fs::write(&path, r#"{ "requestedLiveContainers": 5, "statsPersist": false }"#)
            .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.requested_live_containers, 5);
        assert!(!config.stats_persist);
        assert_eq!(config.running_state, "running");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(Some(&dir.path().join("nope.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut config = AppConfig::default();
        config.merge(ConfigOverrides {
            requested_live_containers: Some(5),
            starting_host_port: Some(9000),
            no_stats_display: true,
            skip_build: true,
            ..Default::default()
        });

        assert_eq!(config.requested_live_containers, 5);
        assert_eq!(config.starting_host_port, 9000);
        assert!(!config.stats_display);
        assert!(config.stats_persist);
        assert!(!config.build_image);
        assert_eq!(config.last_host_port(), Some(9004));
    }

    #[test]
    fn test_validate_rejects_zero_throttle() {
        let config = AppConfig {
            throttle_stats_input_requests: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_port_overflow() {
        let config = AppConfig {
            starting_host_port: 65530,
            requested_live_containers: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let fits = AppConfig {
            starting_host_port: 65530,
            requested_live_containers: 6,
            ..Default::default()
        };
        assert!(fits.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_fleet() {
        let config = AppConfig {
            starting_host_port: 8770,
            requested_live_containers: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_should_emit_throttle() {
        let settings = StatsSettings {
            display: true,
            persist: true,
            throttle: 3,
        };
        let emitted: Vec<u64> = (0..10).filter(|i| settings.should_emit(*i)).collect();
        assert_eq!(emitted, vec![0, 3, 6, 9]);

        let hidden = StatsSettings {
            display: false,
            ..settings
        };
        assert!((0..10).all(|i| !hidden.should_emit(i)));
    }
}
