//! Simulator state field naming.
//!
//! Every piece of generated state is addressed by a field on the emitted
//! `Simulator` struct. The spellings live here so the lowering, the module
//! emitter, and the driver synthesizer can never disagree.

use pulsar_ir::{ArrayId, ExprId, ModuleId, PortId, System};

/// The FIFO field backing a port: `<Module>_<port>`.
pub fn fifo_field(sys: &System, port: PortId) -> String {
    let p = &sys.ports[port];
    format!("{}_{}", sys.module_name(p.module), sys.resolve(p.name))
}

/// The event-queue field of an event-driven module: `<Module>_event`.
pub fn event_field(sys: &System, module: ModuleId) -> String {
    format!("{}_event", sys.module_name(module))
}

/// The per-cycle trigger flag of a module: `<Module>_triggered`.
pub fn triggered_field(sys: &System, module: ModuleId) -> String {
    format!("{}_triggered", sys.module_name(module))
}

/// The FFI handle field of an externally-implemented module: `<Module>_ffi`.
pub fn handle_field(sys: &System, module: ModuleId) -> String {
    format!("{}_ffi", sys.module_name(module))
}

/// The pending-evaluation flag of an externally-implemented module.
pub fn dirty_field(sys: &System, module: ModuleId) -> String {
    format!("{}_dirty", sys.module_name(module))
}

/// The storage field of an array.
pub fn array_field(sys: &System, array: ArrayId) -> String {
    sys.resolve(sys.arrays[array].name).to_string()
}

/// The cached-value slot of an exposed expression: `<name>_value`.
pub fn value_field(sys: &System, expr: ExprId) -> String {
    format!("{}_value", sys.expr_name(expr))
}
