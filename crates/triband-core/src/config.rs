//! Configuration for the Triband effect core
//!
//! Provides generic YAML configuration loading and saving plus the
//! `TribandConfig` value consumed at startup: extra plugin search paths and
//! the default crossover/gain settings applied to a fresh engine.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::params::EngineParams;
use crate::types::NUM_BANDS;

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => {
                log::info!("load_config: Successfully loaded config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!(
                "load_config: Failed to read config file: {}, using defaults",
                e
            );
            T::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}

/// Get the default config file path
///
/// Returns: `<config dir>/triband/triband.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("triband")
        .join("triband.yaml")
}

/// Startup configuration for the effect core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TribandConfig {
    /// Extra plugin search paths, added to the platform defaults
    pub search_paths: Vec<PathBuf>,
    /// Default low/mid crossover frequency in Hz
    pub low_mid_hz: f32,
    /// Default mid/high crossover frequency in Hz
    pub mid_high_hz: f32,
    /// Default per-band linear gains (low, mid, high), 0.0-1.0
    pub band_gains: [f32; NUM_BANDS],
}

impl Default for TribandConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            low_mid_hz: 250.0,
            mid_high_hz: 4000.0,
            band_gains: [0.5; NUM_BANDS],
        }
    }
}

impl TribandConfig {
    /// Load from the default config path
    pub fn load_default() -> Self {
        load_config(&default_config_path())
    }

    /// Push the configured crossover and gain defaults into engine parameters
    pub fn apply(&self, params: &EngineParams) {
        params.set_band_splits(self.low_mid_hz, self.mid_high_hz);
        for (band, &gain) in self.band_gains.iter().enumerate() {
            params.set_band_gain(band, gain);
        }
    }
}
