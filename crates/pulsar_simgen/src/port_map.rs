//! Write-port arbitration.
//!
//! Arrays may be written by several modules in the same cycle. Before any
//! code is emitted, [`WritePortArbiter::scan`] walks every expression in
//! every module once and hands each `(array, writer)` pair a stable port
//! index: first writer first served, monotonic per array. The driver
//! synthesizer sizes each array's multi-port storage from the resulting
//! counts. The arbiter is an explicit value owned by the elaboration call;
//! re-scanning a system builds a fresh, identical assignment.

use crate::walk::module_exprs;
use pulsar_ir::{ArrayId, ExprKind, ModuleId, System};
use std::collections::BTreeMap;

/// The writer of one arbitrated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Writer {
    /// An IR module.
    Module(ModuleId),
    /// The memory model's completion path, which writes the backing array
    /// outside any module.
    DramCallback,
}

/// Deterministic `(array, writer) → port index` assignment.
#[derive(Debug, Default)]
pub struct WritePortArbiter {
    assignments: BTreeMap<(ArrayId, Writer), usize>,
    counts: BTreeMap<ArrayId, usize>,
}

impl WritePortArbiter {
    /// Creates an empty arbiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans a whole system, registering every array write and memory-write
    /// intrinsic in module declaration order and program order within each
    /// module.
    pub fn scan(sys: &System) -> Self {
        let mut arbiter = Self::new();
        for (module, _) in sys.modules.iter() {
            for expr in module_exprs(sys, module) {
                match sys.exprs[expr].kind {
                    ExprKind::ArrayWrite { array, .. } => {
                        arbiter.get_or_assign_port(array, Writer::Module(module));
                    }
                    ExprKind::MemWrite { array, .. } => {
                        arbiter.get_or_assign_port(array, Writer::DramCallback);
                    }
                    _ => {}
                }
            }
        }
        arbiter
    }

    /// Returns the existing port for `(array, writer)` or assigns the next
    /// free index. A writer issuing many writes to one array keeps a single
    /// index.
    pub fn get_or_assign_port(&mut self, array: ArrayId, writer: Writer) -> usize {
        if let Some(&port) = self.assignments.get(&(array, writer)) {
            return port;
        }
        let next = self.counts.entry(array).or_insert(0);
        let port = *next;
        *next += 1;
        self.assignments.insert((array, writer), port);
        port
    }

    /// The assigned port for `(array, writer)`, if any.
    pub fn port_of(&self, array: ArrayId, writer: Writer) -> Option<usize> {
        self.assignments.get(&(array, writer)).copied()
    }

    /// The number of ports the array's storage must provide (at least 1,
    /// even for arrays nobody writes).
    pub fn port_count(&self, array: ArrayId) -> usize {
        self.counts.get(&array).copied().unwrap_or(0).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_ir::{BodyBuilder, DataType};

    fn two_writer_system() -> (System, ArrayId, ModuleId, ModuleId) {
        let mut sys = System::new("t");
        let arr = sys.add_array("shared", DataType::UInt(32), 4, None);
        let a = sys.add_event_module("A");
        let b = sys.add_event_module("B");
        for m in [a, b] {
            let mut body = BodyBuilder::new(&mut sys, m);
            let idx = body.int_imm(DataType::UInt(2), 0);
            let val = body.int_imm(DataType::UInt(32), 1);
            body.array_write(arr, idx, val);
            // A second write from the same module keeps the same port.
            body.array_write(arr, idx, val);
        }
        (sys, arr, a, b)
    }

    #[test]
    fn distinct_writers_get_distinct_ports() {
        let (sys, arr, a, b) = two_writer_system();
        let arbiter = WritePortArbiter::scan(&sys);
        let pa = arbiter.port_of(arr, Writer::Module(a)).unwrap();
        let pb = arbiter.port_of(arr, Writer::Module(b)).unwrap();
        assert_ne!(pa, pb);
        assert_eq!(arbiter.port_count(arr), 2);
    }

    #[test]
    fn first_writer_first_served() {
        let (sys, arr, a, b) = two_writer_system();
        let arbiter = WritePortArbiter::scan(&sys);
        assert_eq!(arbiter.port_of(arr, Writer::Module(a)), Some(0));
        assert_eq!(arbiter.port_of(arr, Writer::Module(b)), Some(1));
    }

    #[test]
    fn rescan_is_stable() {
        let (sys, arr, a, b) = two_writer_system();
        let first = WritePortArbiter::scan(&sys);
        let second = WritePortArbiter::scan(&sys);
        assert_eq!(
            first.port_of(arr, Writer::Module(a)),
            second.port_of(arr, Writer::Module(a))
        );
        assert_eq!(
            first.port_of(arr, Writer::Module(b)),
            second.port_of(arr, Writer::Module(b))
        );
    }

    #[test]
    fn unwritten_arrays_still_have_one_port() {
        let mut sys = System::new("t");
        let arr = sys.add_array("rom", DataType::UInt(8), 16, None);
        let arbiter = WritePortArbiter::scan(&sys);
        assert_eq!(arbiter.port_count(arr), 1);
    }

    #[test]
    fn mem_write_uses_the_dram_writer() {
        let mut sys = System::new("t");
        let arr = sys.add_array("dram_store", DataType::UInt(64), 16, None);
        let m = sys.add_event_module("Mem");
        let mut body = BodyBuilder::new(&mut sys, m);
        let idx = body.int_imm(DataType::UInt(4), 0);
        let val = body.int_imm(DataType::UInt(64), 9);
        body.mem_write(arr, idx, val);
        drop(body);

        let arbiter = WritePortArbiter::scan(&sys);
        assert_eq!(arbiter.port_of(arr, Writer::DramCallback), Some(0));
        assert_eq!(arbiter.port_of(arr, Writer::Module(m)), None);
    }
}
