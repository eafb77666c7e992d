//! Simulator runtime parameters.
//!
//! [`SimConfig`] carries the knobs the generated simulator and the
//! elaboration pipeline consume: the cycle budget, the idle-termination
//! threshold, evaluation-order shuffling, the resource base for array
//! initialization files, and the default FIFO depth. Configs load from
//! TOML or start from [`SimConfig::default`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_sim_threshold() -> usize {
    100
}

fn default_idle_threshold() -> usize {
    5
}

fn default_fifo_depth() -> usize {
    4
}

fn default_resource_base() -> PathBuf {
    PathBuf::from(".")
}

fn default_override_dump() -> bool {
    true
}

/// Parameters of one simulator generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Maximum number of simulated cycles.
    pub sim_threshold: usize,
    /// Consecutive idle cycles after which the simulation stops.
    pub idle_threshold: usize,
    /// Shuffle event-driven module evaluation order each cycle.
    pub random: bool,
    /// Base path for array initialization files.
    pub resource_base: PathBuf,
    /// Queue depth for ports without an explicit override.
    pub fifo_depth: usize,
    /// Output directory name for the generated simulator crate;
    /// `<system>_simulator` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator_dirname: Option<String>,
    /// Output directory name for generated FFI build units;
    /// `<system>_verilator` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verilator_dirname: Option<String>,
    /// Remove a pre-existing output directory before generating.
    pub override_dump: bool,
    /// Run `cargo fmt` over the generated crate (failures are warnings).
    pub format: bool,
    /// Path to the runtime crate the generated simulator links against;
    /// resolved relative to this workspace when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_threshold: default_sim_threshold(),
            idle_threshold: default_idle_threshold(),
            random: false,
            resource_base: default_resource_base(),
            fifo_depth: default_fifo_depth(),
            simulator_dirname: None,
            verilator_dirname: None,
            override_dump: default_override_dump(),
            format: false,
            runtime_path: None,
        }
    }
}

impl SimConfig {
    /// Checks cross-field invariants after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sim_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.idle_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "idle_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fifo_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fifo_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sim_threshold, 100);
        assert_eq!(config.idle_threshold, 5);
        assert!(!config.random);
    }

    #[test]
    fn zero_thresholds_rejected() {
        let config = SimConfig {
            sim_threshold: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            idle_threshold: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let config = SimConfig {
            sim_threshold: 200,
            random: true,
            ..SimConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: SimConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.sim_threshold, 200);
        assert!(back.random);
    }
}
