//! Configuration errors.

use std::io;

/// Errors produced while loading or validating a [`SimConfig`](crate::SimConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    /// The config file is not valid TOML or has unknown fields.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value outside its legal range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why the value is rejected.
        reason: String,
    },
}
