//! Network Configuration - detection thresholds as operator-tunable TOML values
//!
//! Every numeric threshold in the detection engines is a field here. Each
//! struct implements `Default` with the values the detectors were tuned
//! against, so behavior is unchanged when no config file is present.
//!
//! ## Loading Order
//!
//! 1. `HYDROSENTRY_CONFIG` environment variable (path to TOML file)
//! 2. `network_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The config is passed explicitly into [`crate::twin::DigitalTwin::new`] —
//! there is no process-wide singleton, so tests can inject isolated instances.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a network deployment.
///
/// Load with [`NetworkConfig::load`] which searches the standard locations,
/// or [`NetworkConfig::default`] for the tuned built-ins.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NetworkConfig {
    /// Residual classifier thresholds
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Physics engine constants and tolerances
    #[serde(default)]
    pub physics: PhysicsConfig,

    /// Per-segment calibration gating
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Assumed pipe geometry (per-segment survey data not yet available)
    #[serde(default)]
    pub pipes: PipeConfig,
}

impl NetworkConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HYDROSENTRY_CONFIG` environment variable
    /// 2. `./network_config.toml`
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("HYDROSENTRY_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded network config from HYDROSENTRY_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from HYDROSENTRY_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "HYDROSENTRY_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("network_config.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!(path = %local.display(), "Loaded network config");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse ./network_config.toml, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load and parse a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ============================================================================
// Residual Classifier
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// Flow residual percentage above which the classifier flags (percent)
    #[serde(default = "default_residual_threshold_pct")]
    pub residual_threshold_pct: f64,

    /// Pressure-drop sensitivity: flag when observed pressure falls below
    /// rolling mean × this factor
    #[serde(default = "default_pressure_sensitivity")]
    pub pressure_sensitivity: f64,

    /// Rolling pressure window capacity per segment
    #[serde(default = "default_pressure_window")]
    pub pressure_window: usize,

    /// Confidence discount applied to a leak call lacking pressure corroboration
    #[serde(default = "default_uncorroborated_discount")]
    pub uncorroborated_discount: f64,
}

fn default_residual_threshold_pct() -> f64 {
    15.0
}
fn default_pressure_sensitivity() -> f64 {
    0.9
}
fn default_pressure_window() -> usize {
    50
}
fn default_uncorroborated_discount() -> f64 {
    0.7
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            residual_threshold_pct: default_residual_threshold_pct(),
            pressure_sensitivity: default_pressure_sensitivity(),
            pressure_window: default_pressure_window(),
            uncorroborated_discount: default_uncorroborated_discount(),
        }
    }
}

// ============================================================================
// Physics Engine
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhysicsConfig {
    /// Default pipe roughness coefficient when a segment has no survey value
    #[serde(default = "default_roughness")]
    pub default_roughness: f64,

    /// Water density (kg/m³)
    #[serde(default = "default_density")]
    pub water_density: f64,

    /// Acceptable pressure deviation before the consistency check fails (fraction)
    #[serde(default = "default_pressure_tolerance")]
    pub pressure_tolerance: f64,

    /// Flow residual percentage above which the excess-flow signal fires (percent)
    #[serde(default = "default_excess_flow_pct")]
    pub excess_flow_pct: f64,

    /// Acceptable mass-balance discrepancy (fraction)
    #[serde(default = "default_conservation_tolerance")]
    pub conservation_tolerance: f64,
}

fn default_roughness() -> f64 {
    0.01
}
fn default_density() -> f64 {
    1000.0
}
fn default_pressure_tolerance() -> f64 {
    0.10
}
fn default_excess_flow_pct() -> f64 {
    15.0
}
fn default_conservation_tolerance() -> f64 {
    0.15
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            default_roughness: default_roughness(),
            water_density: default_density(),
            pressure_tolerance: default_pressure_tolerance(),
            excess_flow_pct: default_excess_flow_pct(),
            conservation_tolerance: default_conservation_tolerance(),
        }
    }
}

// ============================================================================
// Calibration Store
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationConfig {
    /// Rolling window capacity per segment
    #[serde(default = "default_calibration_window")]
    pub window: usize,

    /// Minimum accumulated samples before calibration may fire
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Residual standard deviation must be below this (L/min)
    #[serde(default = "default_max_residual_std")]
    pub max_residual_std: f64,

    /// Fraction of leak-flagged entries must be below this
    #[serde(default = "default_max_leak_rate")]
    pub max_leak_rate: f64,

    /// Mean residual magnitude must exceed this to be worth absorbing (L/min)
    #[serde(default = "default_min_mean_offset")]
    pub min_mean_offset: f64,

    /// Damping factor for updates once a segment already holds an offset
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

fn default_calibration_window() -> usize {
    50
}
fn default_min_samples() -> usize {
    20
}
fn default_max_residual_std() -> f64 {
    5.0
}
fn default_max_leak_rate() -> f64 {
    0.1
}
fn default_min_mean_offset() -> f64 {
    3.0
}
fn default_smoothing() -> f64 {
    0.1
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window: default_calibration_window(),
            min_samples: default_min_samples(),
            max_residual_std: default_max_residual_std(),
            max_leak_rate: default_max_leak_rate(),
            min_mean_offset: default_min_mean_offset(),
            smoothing: default_smoothing(),
        }
    }
}

// ============================================================================
// Pipe Geometry Assumptions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipeConfig {
    /// Assumed segment length (m)
    #[serde(default = "default_pipe_length")]
    pub length_m: f64,

    /// Assumed pipe inner diameter (m)
    #[serde(default = "default_pipe_diameter")]
    pub diameter_m: f64,

    /// Assumed source pressure at the segment inlet (PSI)
    #[serde(default = "default_base_pressure")]
    pub base_pressure_psi: f64,
}

fn default_pipe_length() -> f64 {
    1000.0
}
fn default_pipe_diameter() -> f64 {
    0.3
}
fn default_base_pressure() -> f64 {
    100.0
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            length_m: default_pipe_length(),
            diameter_m: default_pipe_diameter(),
            base_pressure_psi: default_base_pressure(),
        }
    }
}
