//! The top-level IR container.
//!
//! A [`System`] owns every module, port, array, wire, expression, and block
//! of one hardware design, plus the name interner. It is built through the
//! construction methods here and [`BodyBuilder`](crate::build::BodyBuilder),
//! then frozen and handed to code generation.

use crate::arena::Arena;
use crate::array::Array;
use crate::block::{Block, BlockKind, Stmt};
use crate::dtype::DataType;
use crate::expr::Expr;
use crate::ids::{ArrayId, BlockId, ExprId, ModuleId, PortId, WireId};
use crate::module::{ExternalSpec, Module, ModuleKind, Port, Wire, WireDirection};
use pulsar_common::{Ident, Interner};
use std::fmt;
use std::path::PathBuf;

/// A complete hardware design under construction or frozen for codegen.
pub struct System {
    /// The design name; generated artifacts are prefixed with it.
    pub name: String,
    /// The name interner shared by all entities.
    pub interner: Interner,
    /// All modules, in declaration order.
    pub modules: Arena<ModuleId, Module>,
    /// All FIFO ports.
    pub ports: Arena<PortId, Port>,
    /// All register arrays.
    pub arrays: Arena<ArrayId, Array>,
    /// All wires of externally-implemented modules.
    pub wires: Arena<WireId, Wire>,
    /// All expression nodes.
    pub exprs: Arena<ExprId, Expr>,
    /// All statement blocks.
    pub blocks: Arena<BlockId, Block>,
}

impl System {
    /// Creates an empty system with the given design name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interner: Interner::new(),
            modules: Arena::new(),
            ports: Arena::new(),
            arrays: Arena::new(),
            wires: Arena::new(),
            exprs: Arena::new(),
            blocks: Arena::new(),
        }
    }

    fn add_module(&mut self, name: &str, kind: ModuleKind, external: Option<ExternalSpec>) -> ModuleId {
        let ident = self.interner.intern(name);
        assert!(
            self.find_module(name).is_none(),
            "module name collision: {name}"
        );
        let module = self.modules.next_id();
        let body = self.blocks.alloc(Block {
            kind: BlockKind::Plain,
            stmts: Vec::new(),
            module,
        });
        self.modules.alloc(Module {
            name: ident,
            kind,
            body,
            external,
        })
    }

    /// Adds an event-driven module with no ports yet.
    pub fn add_event_module(&mut self, name: &str) -> ModuleId {
        self.add_module(name, ModuleKind::Event { ports: Vec::new() }, None)
    }

    /// Adds a dependency-driven (downstream) module.
    pub fn add_downstream_module(&mut self, name: &str) -> ModuleId {
        self.add_module(name, ModuleKind::Downstream, None)
    }

    /// Adds an externally-implemented module backed by a hardware source.
    pub fn add_external_module(
        &mut self,
        name: &str,
        source: impl Into<PathBuf>,
        top_module: &str,
        has_clock: bool,
        has_reset: bool,
    ) -> ModuleId {
        let spec = ExternalSpec {
            source: source.into(),
            top_module: top_module.to_string(),
            has_clock,
            has_reset,
            wires: Vec::new(),
        };
        self.add_module(name, ModuleKind::Event { ports: Vec::new() }, Some(spec))
    }

    /// Adds a FIFO port to an event-driven module.
    ///
    /// # Panics
    ///
    /// Panics on a name collision within the module, on a zero bit width,
    /// or when the module is dependency-driven.
    pub fn add_port(&mut self, module: ModuleId, name: &str, dtype: DataType) -> PortId {
        assert!(dtype.bits() > 0, "port {name} has zero bit width");
        let ident = self.interner.intern(name);
        let existing = self.modules[module]
            .ports()
            .iter()
            .any(|&p| self.ports[p].name == ident);
        assert!(
            !existing,
            "port name collision on {}: {name}",
            self.module_name(module)
        );
        let port = self.ports.alloc(Port {
            name: ident,
            dtype,
            module,
            depth: None,
        });
        match &mut self.modules[module].kind {
            ModuleKind::Event { ports } => ports.push(port),
            ModuleKind::Downstream => panic!("downstream modules have no FIFO ports"),
        }
        port
    }

    /// Overrides the queue depth of one port.
    pub fn set_port_depth(&mut self, port: PortId, depth: usize) {
        self.ports[port].depth = Some(depth);
    }

    /// Adds a directed wire to an externally-implemented module, along with
    /// the companion FIFO port used when the block is driven directly.
    ///
    /// # Panics
    ///
    /// Panics when the module carries no [`ExternalSpec`] or on a wire name
    /// collision within the module.
    pub fn add_wire(
        &mut self,
        module: ModuleId,
        name: &str,
        dtype: DataType,
        direction: WireDirection,
    ) -> WireId {
        assert!(dtype.bits() > 0, "wire {name} has zero bit width");
        let ident = self.interner.intern(name);
        let spec = self.modules[module]
            .external
            .as_ref()
            .unwrap_or_else(|| panic!("{} is not externally implemented", self.resolve_name(module)));
        let collision = spec.wires.iter().any(|&w| self.wires[w].name == ident);
        assert!(
            !collision,
            "wire name collision on {}: {name}",
            self.resolve_name(module)
        );
        let wire = self.wires.alloc(Wire {
            name: ident,
            dtype,
            direction,
            owner: module,
        });
        self.modules[module]
            .external
            .as_mut()
            .expect("checked above")
            .wires
            .push(wire);
        self.add_port(module, name, dtype);
        wire
    }

    /// Adds a register array, optionally pre-initialized.
    pub fn add_array(
        &mut self,
        name: &str,
        scalar_ty: DataType,
        size: usize,
        init: Option<Vec<u64>>,
    ) -> ArrayId {
        assert!(scalar_ty.bits() > 0, "array {name} has zero element width");
        assert!(size > 0, "array {name} has zero size");
        if let Some(values) = &init {
            assert!(
                values.len() <= size,
                "array {name} initializer longer than the array"
            );
        }
        let ident = self.interner.intern(name);
        self.arrays.alloc(Array {
            name: ident,
            scalar_ty,
            size,
            init,
            init_file: None,
        })
    }

    /// Attaches a hex initialization file to an array.
    pub fn set_array_init_file(&mut self, array: ArrayId, file: &str) {
        self.arrays[array].init_file = Some(file.to_string());
    }

    /// Resolves an interned name.
    pub fn resolve(&self, ident: Ident) -> &str {
        self.interner.resolve(ident)
    }

    /// The name of a module.
    pub fn module_name(&self, module: ModuleId) -> &str {
        self.resolve(self.modules[module].name)
    }

    fn resolve_name(&self, module: ModuleId) -> String {
        self.module_name(module).to_string()
    }

    /// Finds a module by name.
    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .find(|(_, m)| self.resolve(m.name) == pulsar_common::sanitize_ident(name))
            .map(|(id, _)| id)
    }

    /// Event-driven modules in declaration order.
    pub fn event_modules(&self) -> Vec<ModuleId> {
        self.modules
            .iter()
            .filter(|(_, m)| !m.is_downstream())
            .map(|(id, _)| id)
            .collect()
    }

    /// Dependency-driven modules in declaration order.
    pub fn downstream_modules(&self) -> Vec<ModuleId> {
        self.modules
            .iter()
            .filter(|(_, m)| m.is_downstream())
            .map(|(id, _)| id)
            .collect()
    }

    /// Externally-implemented modules in declaration order.
    pub fn external_modules(&self) -> Vec<ModuleId> {
        self.modules
            .iter()
            .filter(|(_, m)| m.is_external())
            .map(|(id, _)| id)
            .collect()
    }

    /// The generated-code variable name of an expression.
    pub fn expr_name(&self, expr: ExprId) -> &str {
        self.resolve(self.exprs[expr].name)
    }

    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, block: BlockId, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for stmt in &self.blocks[block].stmts {
            match stmt {
                Stmt::Expr(e) => {
                    let expr = &self.exprs[*e];
                    if expr.is_valued() {
                        writeln!(f, "{pad}{} = {:?}", self.resolve(expr.name), expr.kind)?;
                    } else {
                        writeln!(f, "{pad}{:?}", expr.kind)?;
                    }
                }
                Stmt::Block(b) => {
                    match self.blocks[*b].kind {
                        BlockKind::Plain => writeln!(f, "{pad}block {{")?,
                        BlockKind::Cond { cond } => {
                            writeln!(f, "{pad}when {} {{", self.expr_name(cond))?
                        }
                        BlockKind::Cycled { cycle } => writeln!(f, "{pad}cycle {cycle} {{")?,
                    }
                    self.fmt_block(f, *b, indent + 1)?;
                    writeln!(f, "{pad}}}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for System {
    /// Dumps the system in a compact textual form, for debugging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "system {} {{", self.name)?;
        for (_, array) in self.arrays.iter() {
            writeln!(
                f,
                "  array {}[{}; {}]",
                self.resolve(array.name),
                array.scalar_ty,
                array.size
            )?;
        }
        for (id, module) in self.modules.iter() {
            let kind = if module.is_downstream() {
                "downstream"
            } else if module.is_external() {
                "external"
            } else {
                "module"
            };
            write!(f, "  {kind} {}(", self.module_name(id))?;
            for (i, &port) in module.ports().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let p = &self.ports[port];
                write!(f, "{}: {}", self.resolve(p.name), p.dtype)?;
            }
            writeln!(f, ") {{")?;
            self.fmt_block(f, module.body, 2)?;
            writeln!(f, "  }}")?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_lookup_by_name() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        assert_eq!(sys.find_module("Driver"), Some(m));
        assert_eq!(sys.find_module("Missing"), None);
    }

    #[test]
    #[should_panic(expected = "module name collision")]
    fn duplicate_module_name_rejected() {
        let mut sys = System::new("t");
        sys.add_event_module("Driver");
        sys.add_event_module("Driver");
    }

    #[test]
    #[should_panic(expected = "port name collision")]
    fn duplicate_port_name_rejected() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Adder");
        sys.add_port(m, "a", DataType::Int(32));
        sys.add_port(m, "a", DataType::Int(32));
    }

    #[test]
    #[should_panic(expected = "zero bit width")]
    fn zero_width_port_rejected() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Adder");
        sys.add_port(m, "a", DataType::Int(0));
    }

    #[test]
    fn external_module_wires_get_companion_ports() {
        let mut sys = System::new("t");
        let m = sys.add_external_module("Alu", "rtl/alu.sv", "alu", true, true);
        sys.add_wire(m, "a", DataType::UInt(8), WireDirection::Input);
        sys.add_wire(m, "y", DataType::UInt(8), WireDirection::Output);
        assert_eq!(sys.modules[m].ports().len(), 2);
        assert_eq!(sys.modules[m].external.as_ref().unwrap().wires.len(), 2);
    }

    #[test]
    fn module_kind_partitions() {
        let mut sys = System::new("t");
        sys.add_event_module("Driver");
        sys.add_downstream_module("Sink");
        assert_eq!(sys.event_modules().len(), 1);
        assert_eq!(sys.downstream_modules().len(), 1);
    }

    #[test]
    fn display_lists_modules_and_arrays() {
        let mut sys = System::new("demo");
        sys.add_array("cnt", DataType::UInt(32), 1, None);
        sys.add_event_module("Driver");
        let dump = sys.to_string();
        assert!(dump.contains("system demo"));
        assert!(dump.contains("array cnt[u32; 1]"));
        assert!(dump.contains("module Driver()"));
    }
}
