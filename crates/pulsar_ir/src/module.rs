//! Modules, ports, wires, and external-implementation specs.
//!
//! A module is either *event-driven* (owns FIFO ports, scheduled by an
//! explicit event queue of activation stamps) or *dependency-driven*
//! ("downstream": re-evaluated whenever any upstream producer fired in the
//! current cycle). Externally-implemented modules additionally carry an
//! [`ExternalSpec`] pointing at the hardware source that realizes them.

use crate::dtype::DataType;
use crate::ids::{BlockId, ModuleId, PortId, WireId};
use pulsar_common::Ident;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a module is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// Event-driven: owns FIFO ports and an activation-event queue.
    Event {
        /// The module's FIFO ports, in declaration order.
        ports: Vec<PortId>,
    },
    /// Dependency-driven: re-fires when any upstream producer fired.
    Downstream,
}

/// The direction of a wire on an externally-implemented module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireDirection {
    /// Driven by consumer code through `WireAssign`.
    Input,
    /// Observed by consumer code through `WireRead`.
    Output,
}

/// A directed signal on an externally-implemented module.
///
/// The owner link is fixed at construction; wire resolution is a direct
/// field access, never a runtime search.
#[derive(Debug, Clone)]
pub struct Wire {
    /// The wire name.
    pub name: Ident,
    /// The wire's element type.
    pub dtype: DataType,
    /// The declared direction.
    pub direction: WireDirection,
    /// The module declaring this wire.
    pub owner: ModuleId,
}

/// The native-hardware backing of an externally-implemented module.
#[derive(Debug, Clone)]
pub struct ExternalSpec {
    /// Path to the hardware source file (copied into the build unit).
    pub source: PathBuf,
    /// The top module name handed to the hardware compiler.
    pub top_module: String,
    /// Whether the block declares a clock line.
    pub has_clock: bool,
    /// Whether the block declares a reset line.
    pub has_reset: bool,
    /// The block's wires, in declaration order.
    pub wires: Vec<WireId>,
}

/// A FIFO endpoint owned by one event-driven module.
#[derive(Debug, Clone)]
pub struct Port {
    /// The port name.
    pub name: Ident,
    /// The element type.
    pub dtype: DataType,
    /// The owning module.
    pub module: ModuleId,
    /// Per-port queue depth override (config default when `None`).
    pub depth: Option<usize>,
}

/// A unit of hardware behavior.
#[derive(Debug, Clone)]
pub struct Module {
    /// The unique module name.
    pub name: Ident,
    /// The scheduling kind.
    pub kind: ModuleKind,
    /// The root body block.
    pub body: BlockId,
    /// Present when this module's logic lives in compiled hardware.
    pub external: Option<ExternalSpec>,
}

impl Module {
    /// The module's FIFO ports (empty for downstream modules).
    pub fn ports(&self) -> &[PortId] {
        match &self.kind {
            ModuleKind::Event { ports } => ports,
            ModuleKind::Downstream => &[],
        }
    }

    /// Returns `true` for dependency-driven modules.
    pub fn is_downstream(&self) -> bool {
        matches!(self.kind, ModuleKind::Downstream)
    }

    /// Returns `true` for externally-implemented modules.
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }
}
