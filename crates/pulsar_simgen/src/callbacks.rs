//! Memory-callback metadata.
//!
//! The memory intrinsics are keyed by three facts scattered across the IR:
//! which FIFO receives responses (`UseDram`), which array backs the memory
//! (`MemWrite`), and which module owns the memory traffic. One scan
//! collects them before lowering begins.

use crate::walk::module_exprs;
use pulsar_ir::{ArrayId, ExprKind, ModuleId, PortId, System};

/// Facts the memory intrinsics lower against.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackInfo {
    /// The FIFO that receives completed read payloads.
    pub resp_fifo: Option<PortId>,
    /// The array backing the memory contents.
    pub store_array: Option<ArrayId>,
    /// The module issuing memory traffic.
    pub memory_module: Option<ModuleId>,
}

/// Scans the system for memory-intrinsic metadata.
pub fn collect(sys: &System) -> CallbackInfo {
    let mut info = CallbackInfo::default();
    for (module, _) in sys.modules.iter() {
        for expr in module_exprs(sys, module) {
            match sys.exprs[expr].kind {
                ExprKind::UseDram { port } => {
                    info.resp_fifo = Some(port);
                }
                ExprKind::MemWrite { array, .. } => {
                    info.store_array = Some(array);
                    info.memory_module = Some(module);
                }
                _ => {}
            }
        }
    }
    info
}
