//! Code-generation error types.
//!
//! Everything here is fatal at elaboration time: the IR is malformed, an
//! external block's source is unusable, or the output tree cannot be
//! written. Scheduling suspensions are not errors and never appear here;
//! they exist only inside the generated simulator.

use std::io;
use std::path::PathBuf;

/// Errors produced while generating a simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimGenError {
    /// A construct requires a width the backend cannot represent.
    #[error("unsupported bit width {bits} for {context}")]
    UnsupportedWidth {
        /// The offending width.
        bits: u32,
        /// What carried the width.
        context: String,
    },

    /// An externally-implemented module has no hardware source on disk.
    #[error("hardware source for module {module} not found: {path}")]
    ExternalSourceMissing {
        /// The external module's name.
        module: String,
        /// The missing path.
        path: PathBuf,
    },

    /// An externally-implemented module never named its top module.
    #[error("external module {module} does not name a top module")]
    MissingTopModule {
        /// The external module's name.
        module: String,
    },

    /// An expression kind appeared somewhere the backend cannot place it.
    #[error("cannot lower {what}: {reason}")]
    Unsupported {
        /// The offending construct.
        what: String,
        /// Why it is rejected.
        reason: String,
    },

    /// The dependency-driven module graph is cyclic.
    #[error(transparent)]
    Ir(#[from] pulsar_ir::IrError),

    /// The simulator configuration is invalid.
    #[error(transparent)]
    Config(#[from] pulsar_config::ConfigError),

    /// The output tree could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The external-module manifest could not be serialized.
    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
