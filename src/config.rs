use std::{env, fs, path::PathBuf, time::Duration};

use crate::prelude::*;
use serde::{Deserialize, Serialize};

const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Persistent configuration of the monitor.
///
/// Stored at `~/.config/proc-keeper/config.yaml`. Every field can be overridden from the
/// command line.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct KeeperConfig {
    /// How often CPU usage of the tree is sampled while waiting for events
    pub sample_interval_ms: u64,
    /// Where to write the reap report, none by default
    pub output_dir: Option<PathBuf>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            output_dir: None,
        }
    }
}

/// Get the path to the configuration file, following the XDG Base Directory Specification
///
/// If config_name is None, returns ~/.config/proc-keeper/config.yaml (default)
/// If config_name is Some, returns ~/.config/proc-keeper/{config_name}.yaml
fn get_configuration_file_path(config_name: Option<&str>) -> Option<PathBuf> {
    let config_dir = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok()?
        .join("proc-keeper");

    Some(match config_name {
        Some(name) => config_dir.join(format!("{name}.yaml")),
        None => config_dir.join("config.yaml"),
    })
}

impl KeeperConfig {
    /// Load the configuration. If it does not exist, return a default configuration.
    pub fn load(config_name: Option<&str>) -> Result<Self> {
        let Some(config_path) = get_configuration_file_path(config_name) else {
            debug!("No configuration directory, using the default config");
            return Ok(Self::default());
        };

        match fs::read(&config_path) {
            Ok(config_str) => {
                let config: KeeperConfig = serde_yaml::from_slice(&config_str).context(
                    format!("Failed to parse config at {}", config_path.display()),
                )?;
                debug!("Config loaded from {}", config_path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found at {}", config_path.display());
                Ok(Self::default())
            }
            Err(e) => bail!("Failed to load config: {e}"),
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
