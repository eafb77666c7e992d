//! The Pulsar hardware IR.
//!
//! This crate defines the frozen intermediate representation consumed by
//! code generation: data types, a closed expression enum, statement blocks,
//! modules (event-driven and dependency-driven), FIFO ports, register
//! arrays, and wires of externally-implemented blocks, plus the builder
//! API that constructs bodies and the static analyses the simulator
//! backend depends on.

#![warn(missing_docs)]

pub mod analysis;
pub mod arena;
pub mod array;
pub mod block;
pub mod build;
pub mod dtype;
pub mod expr;
pub mod ids;
pub mod module;
pub mod system;

pub use analysis::{downstream_topo_order, expr_externally_used, externally_used_exprs, upstreams_of, IrError};
pub use arena::{Arena, ArenaId};
pub use array::Array;
pub use block::{Block, BlockKind, Stmt};
pub use build::BodyBuilder;
pub use dtype::DataType;
pub use expr::{binary_result_type, BinOp, BoundArg, CastKind, Expr, ExprKind, UnOp};
pub use ids::{ArrayId, BlockId, ExprId, ModuleId, PortId, WireId};
pub use module::{ExternalSpec, Module, ModuleKind, Port, Wire, WireDirection};
pub use system::System;
