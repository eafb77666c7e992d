//! TOML loading for [`SimConfig`](crate::SimConfig).

use crate::{ConfigError, SimConfig};
use std::fs;
use std::path::Path;

impl SimConfig {
    /// Parses a config from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_partial_config() {
        let config = SimConfig::from_toml_str("sim_threshold = 500\nrandom = true\n").unwrap();
        assert_eq!(config.sim_threshold, 500);
        assert!(config.random);
        // Untouched fields keep their defaults.
        assert_eq!(config.idle_threshold, 5);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(SimConfig::from_toml_str("sim_treshold = 500\n").is_err());
    }

    #[test]
    fn invalid_value_rejected() {
        assert!(SimConfig::from_toml_str("idle_threshold = 0\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fifo_depth = 8").unwrap();
        let config = SimConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.fifo_depth, 8);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SimConfig::from_toml_file("/nonexistent/pulsar.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
