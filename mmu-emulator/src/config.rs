//! Emulator configuration file

use std::path::Path;

use anyhow::{Context, Result};
use mmu_matrix::{DeviceIdentity, MatrixConfig};
use mmu_sim::ListenerConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Contents of `mmu-emulator.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network listener
    pub listener: ListenerConfig,
    /// Matrix shape and switching policy
    pub matrix: MatrixConfig,
    /// Identity reported at the tree root
    pub device: DeviceIdentity,
}

/// Load configuration from file
///
/// A missing file is not an error; every section falls back to defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    } else {
        info!(
            "Configuration file {} not found, using defaults",
            path.display()
        );
        Ok(Config::default())
    }
}
