//! Simulator code generation for the Pulsar hardware compiler.
//!
//! This crate lowers a frozen [`pulsar_ir::System`] into a runnable,
//! cycle-accurate Rust simulator crate. The pipeline runs in dependency
//! order: the write-port arbitrator sizes multi-port array storage, the
//! FFI bridge generator emits one isolated build unit per
//! externally-implemented module, the module emitter lowers each body into
//! a step function (expression lowering keeps bit widths exact and stages
//! every mutation), and the driver synthesizer assembles the simulator
//! state and the stamp-driven event loop.

#![warn(missing_docs)]

pub mod callbacks;
pub mod elaborate;
pub mod error;
pub mod external;
pub mod lower_expr;
pub mod modules;
pub mod names;
pub mod port_map;
pub mod render;
pub mod simulator;
pub mod walk;

pub use callbacks::{collect as collect_callbacks, CallbackInfo};
pub use elaborate::elaborate;
pub use error::SimGenError;
pub use external::{generate_ffi_crates, ExternalFfiSpec, FfiPort};
pub use lower_expr::{lower_expr, storage_type, Lowered, LowerCtx};
pub use port_map::{WritePortArbiter, Writer};
