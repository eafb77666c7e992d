//! Body construction.
//!
//! [`BodyBuilder`] appends expressions to a module's block tree in program
//! order, maintaining a stack of open blocks for conditional and cycle-gated
//! scopes. Result types are computed here, so the frozen IR is fully typed
//! before code generation sees it.

use crate::block::{Block, BlockKind, Stmt};
use crate::dtype::DataType;
use crate::expr::{binary_result_type, BinOp, BoundArg, CastKind, Expr, ExprKind, UnOp};
use crate::ids::{ArrayId, BlockId, ExprId, ModuleId, PortId, WireId};
use crate::module::WireDirection;
use crate::system::System;

/// Appends statements to one module's body.
///
/// Dropping the builder closes it; open `cond`/`cycle` scopes close with
/// their closures, so the block stack can never be left unbalanced.
pub struct BodyBuilder<'a> {
    sys: &'a mut System,
    module: ModuleId,
    stack: Vec<BlockId>,
}

impl<'a> BodyBuilder<'a> {
    /// Starts building the body of the given module.
    pub fn new(sys: &'a mut System, module: ModuleId) -> Self {
        let root = sys.modules[module].body;
        Self {
            sys,
            module,
            stack: vec![root],
        }
    }

    fn current_block(&self) -> BlockId {
        *self.stack.last().expect("block stack never empties")
    }

    fn append(&mut self, kind: ExprKind, dtype: Option<DataType>) -> ExprId {
        let id = self.sys.exprs.next_id();
        let name = self.sys.interner.intern(&format!("expr{}", id.as_raw()));
        let expr = Expr {
            kind,
            dtype,
            module: self.module,
            name,
        };
        let id = self.sys.exprs.alloc(expr);
        let block = self.current_block();
        self.sys.blocks[block].stmts.push(Stmt::Expr(id));
        id
    }

    fn dtype_of(&self, expr: ExprId) -> DataType {
        self.sys.exprs[expr]
            .dtype
            .unwrap_or_else(|| panic!("expression {} has no value", self.sys.expr_name(expr)))
    }

    /// Renames the generated value binding of an expression.
    pub fn set_name(&mut self, expr: ExprId, hint: &str) {
        self.sys.exprs[expr].name = self.sys.interner.intern(hint);
    }

    /// An integer immediate of the given type.
    pub fn int_imm(&mut self, dtype: DataType, value: u64) -> ExprId {
        assert!(dtype.bits() > 0, "immediate with zero bit width");
        if dtype.bits() < 64 {
            assert!(
                value < (1u64 << dtype.bits()),
                "immediate {value} does not fit in {} bits",
                dtype.bits()
            );
        }
        self.append(ExprKind::IntImm { value }, Some(dtype))
    }

    /// A binary operation; the result type follows the width rules of
    /// [`binary_result_type`].
    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = binary_result_type(op, self.dtype_of(lhs), self.dtype_of(rhs));
        self.append(ExprKind::Binary { op, lhs, rhs }, Some(ty))
    }

    /// A unary operation.
    pub fn unary(&mut self, op: UnOp, x: ExprId) -> ExprId {
        let ty = DataType::Bits(self.dtype_of(x).bits());
        self.append(ExprKind::Unary { op, x }, Some(ty))
    }

    /// Extracts bits `[lo, hi]` inclusive.
    pub fn slice(&mut self, x: ExprId, lo: u32, hi: u32) -> ExprId {
        let width = self.dtype_of(x).bits();
        assert!(lo <= hi, "slice range is reversed: [{lo}, {hi}]");
        assert!(hi < width, "slice [{lo}, {hi}] exceeds {width}-bit value");
        self.append(
            ExprKind::Slice { x, lo, hi },
            Some(DataType::Bits(hi - lo + 1)),
        )
    }

    /// Concatenates two values; `msb` takes the high bits.
    pub fn concat(&mut self, msb: ExprId, lsb: ExprId) -> ExprId {
        let bits = self.dtype_of(msb).bits() + self.dtype_of(lsb).bits();
        self.append(ExprKind::Concat { msb, lsb }, Some(DataType::Bits(bits)))
    }

    /// A two-way mux.
    pub fn select(&mut self, cond: ExprId, then_value: ExprId, else_value: ExprId) -> ExprId {
        let t = self.dtype_of(then_value);
        let e = self.dtype_of(else_value);
        assert_eq!(
            t.bits(),
            e.bits(),
            "select arms must share a width ({t} vs {e})"
        );
        self.append(
            ExprKind::Select {
                cond,
                then_value,
                else_value,
            },
            Some(t),
        )
    }

    /// An N-way one-hot mux; bit *i* of `cond` selects `arms[i]`.
    pub fn select1hot(&mut self, cond: ExprId, arms: &[ExprId]) -> ExprId {
        assert!(!arms.is_empty(), "select1hot needs at least one arm");
        let cond_bits = self.dtype_of(cond).bits();
        assert_eq!(
            cond_bits as usize,
            arms.len(),
            "one-hot condition width must match the arm count"
        );
        assert!(
            cond_bits <= 64,
            "one-hot conditions wider than 64 bits are not supported"
        );
        let ty = self.dtype_of(arms[0]);
        for &arm in arms {
            assert_eq!(
                self.dtype_of(arm).bits(),
                ty.bits(),
                "select1hot arms must share a width"
            );
        }
        self.append(
            ExprKind::Select1Hot {
                cond,
                arms: arms.to_vec(),
            },
            Some(ty),
        )
    }

    /// A zero-extend, sign-extend, or bit-reinterpret cast.
    pub fn cast(&mut self, kind: CastKind, x: ExprId, dtype: DataType) -> ExprId {
        assert!(dtype.bits() > 0, "cast to zero bit width");
        self.append(ExprKind::Cast { kind, x }, Some(dtype))
    }

    /// Reads the committed value of an array element.
    pub fn array_read(&mut self, array: ArrayId, idx: ExprId) -> ExprId {
        let ty = self.sys.arrays[array].scalar_ty;
        self.append(ExprKind::ArrayRead { array, idx }, Some(ty))
    }

    /// Stages a write of an array element, committed at the tick boundary.
    pub fn array_write(&mut self, array: ArrayId, idx: ExprId, value: ExprId) -> ExprId {
        self.append(ExprKind::ArrayWrite { array, idx, value }, None)
    }

    /// Pops the front of a FIFO port, suspending the module when empty.
    pub fn fifo_pop(&mut self, port: PortId) -> ExprId {
        let ty = self.sys.ports[port].dtype;
        self.append(ExprKind::FifoPop { port }, Some(ty))
    }

    /// Stages a push into a FIFO port.
    pub fn fifo_push(&mut self, port: PortId, value: ExprId) -> ExprId {
        self.append(ExprKind::FifoPush { port, value }, None)
    }

    /// Peeks the front of a FIFO port without consuming it.
    pub fn fifo_peek(&mut self, port: PortId) -> ExprId {
        let ty = self.sys.ports[port].dtype;
        self.append(ExprKind::FifoPeek { port }, Some(ty))
    }

    /// `true` when the FIFO port holds at least one value.
    pub fn fifo_valid(&mut self, port: PortId) -> ExprId {
        self.append(ExprKind::FifoValid { port }, Some(DataType::bit()))
    }

    /// `true` when an exposed expression currently has a cached value.
    pub fn value_valid(&mut self, value: ExprId) -> ExprId {
        self.append(ExprKind::ValueValid { value }, Some(DataType::bit()))
    }

    /// `true` when the given module fired this cycle.
    pub fn module_triggered(&mut self, module: ModuleId) -> ExprId {
        self.append(ExprKind::ModuleTriggered { module }, Some(DataType::bit()))
    }

    /// Binds argument values to a callee's ports without firing the call.
    pub fn bind(&mut self, callee: ModuleId, args: &[(PortId, ExprId)]) -> ExprId {
        for &(port, _) in args {
            assert_eq!(
                self.sys.ports[port].module, callee,
                "bound port does not belong to the callee"
            );
        }
        let args = args
            .iter()
            .map(|&(port, value)| BoundArg { port, value })
            .collect();
        self.append(ExprKind::Bind { callee, args }, None)
    }

    /// Fires a previously created bind: stages the argument pushes and
    /// queues the callee's activation for the next cycle.
    pub fn async_call(&mut self, bind: ExprId) -> ExprId {
        assert!(
            matches!(self.sys.exprs[bind].kind, ExprKind::Bind { .. }),
            "async_call expects a bind expression"
        );
        self.append(ExprKind::AsyncCall { bind }, None)
    }

    /// Binds and fires in one step.
    pub fn async_call_to(&mut self, callee: ModuleId, args: &[(PortId, ExprId)]) -> ExprId {
        let bind = self.bind(callee, args);
        self.async_call(bind)
    }

    /// Drives an input wire of an externally-implemented module.
    pub fn wire_assign(&mut self, wire: WireId, value: ExprId) -> ExprId {
        assert_eq!(
            self.sys.wires[wire].direction,
            WireDirection::Input,
            "cannot assign to an output wire"
        );
        self.append(ExprKind::WireAssign { wire, value }, None)
    }

    /// Observes an output wire of an externally-implemented module.
    pub fn wire_read(&mut self, wire: WireId) -> ExprId {
        assert_eq!(
            self.sys.wires[wire].direction,
            WireDirection::Output,
            "cannot read an input wire"
        );
        let ty = self.sys.wires[wire].dtype;
        self.append(ExprKind::WireRead { wire }, Some(ty))
    }

    /// Emits a formatted log line stamped with the current cycle.
    pub fn log(&mut self, format: &str, args: &[ExprId]) -> ExprId {
        let format = self.sys.interner.intern_raw(format);
        self.append(
            ExprKind::Log {
                format,
                args: args.to_vec(),
            },
            None,
        )
    }

    /// Suspends the module for this cycle unless the condition holds.
    pub fn wait_until(&mut self, cond: ExprId) -> ExprId {
        self.append(ExprKind::WaitUntil { cond }, None)
    }

    /// A fatal runtime check in the generated simulator.
    pub fn assert_true(&mut self, cond: ExprId) -> ExprId {
        self.append(ExprKind::Assert { cond }, None)
    }

    /// Terminates the whole simulation.
    pub fn finish(&mut self) -> ExprId {
        self.append(ExprKind::Finish, None)
    }

    /// An ordering hint; generates no simulator code.
    pub fn barrier(&mut self, token: ExprId) -> ExprId {
        self.append(ExprKind::Barrier { token }, None)
    }

    /// Stages a write into the memory model's backing array.
    pub fn mem_write(&mut self, array: ArrayId, idx: ExprId, value: ExprId) -> ExprId {
        self.append(ExprKind::MemWrite { array, idx, value }, None)
    }

    /// Issues a read request to the memory-timing model; yields the
    /// one-bit acceptance flag.
    pub fn send_read_request(&mut self, mem: ModuleId, addr: ExprId) -> ExprId {
        self.append(
            ExprKind::SendReadRequest { mem, addr },
            Some(DataType::bit()),
        )
    }

    /// Issues a write request to the memory-timing model; yields the
    /// one-bit acceptance flag.
    pub fn send_write_request(&mut self, mem: ModuleId, addr: ExprId, we: ExprId) -> ExprId {
        self.append(
            ExprKind::SendWriteRequest { mem, addr, we },
            Some(DataType::bit()),
        )
    }

    /// Declares the FIFO port that receives memory responses.
    pub fn use_dram(&mut self, port: PortId) -> ExprId {
        self.append(ExprKind::UseDram { port }, None)
    }

    /// `true` when a memory response is waiting in the response queue.
    pub fn has_mem_resp(&mut self, mem: ModuleId) -> ExprId {
        self.append(ExprKind::HasMemResp { mem }, Some(DataType::bit()))
    }

    /// The front memory response payload, typed by the caller.
    pub fn mem_resp(&mut self, mem: ModuleId, dtype: DataType) -> ExprId {
        self.append(ExprKind::MemResp { mem }, Some(dtype))
    }

    fn scoped(&mut self, kind: BlockKind, build: impl FnOnce(&mut Self)) {
        let module = self.module;
        let block = self.sys.blocks.alloc(Block {
            kind,
            stmts: Vec::new(),
            module,
        });
        let parent = self.current_block();
        self.sys.blocks[parent].stmts.push(Stmt::Block(block));
        self.stack.push(block);
        build(self);
        self.stack.pop();
    }

    /// Opens a conditional block for the duration of the closure.
    pub fn cond(&mut self, cond: ExprId, build: impl FnOnce(&mut Self)) {
        self.scoped(BlockKind::Cond { cond }, build);
    }

    /// Opens a cycle-gated block for the duration of the closure.
    pub fn cycle(&mut self, cycle: usize, build: impl FnOnce(&mut Self)) {
        self.scoped(BlockKind::Cycled { cycle }, build);
    }

    /// Pops every port of the module after waiting for all of them to hold
    /// a value; the returned IDs follow port declaration order.
    pub fn pop_all_ports(&mut self) -> Vec<ExprId> {
        let ports: Vec<PortId> = self.sys.modules[self.module].ports().to_vec();
        let mut valid: Option<ExprId> = None;
        for &port in &ports {
            let v = self.fifo_valid(port);
            valid = Some(match valid {
                None => v,
                Some(acc) => self.binary(BinOp::And, acc, v),
            });
        }
        if let Some(valid) = valid {
            self.wait_until(valid);
        }
        ports.into_iter().map(|p| self.fifo_pop(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_append_in_program_order() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        let one = b.int_imm(DataType::UInt(8), 1);
        let two = b.int_imm(DataType::UInt(8), 2);
        b.binary(BinOp::Add, one, two);
        drop(b);
        let root = sys.modules[m].body;
        assert_eq!(sys.blocks[root].stmts.len(), 3);
    }

    #[test]
    fn cond_nests_a_block() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        let c = b.int_imm(DataType::bit(), 1);
        b.cond(c, |b| {
            b.finish();
        });
        drop(b);
        let root = sys.modules[m].body;
        // imm + nested block
        assert_eq!(sys.blocks[root].stmts.len(), 2);
        let Stmt::Block(inner) = sys.blocks[root].stmts[1] else {
            panic!("expected a nested block");
        };
        assert!(matches!(sys.blocks[inner].kind, BlockKind::Cond { .. }));
        assert_eq!(sys.blocks[inner].stmts.len(), 1);
    }

    #[test]
    fn binary_types_follow_width_rules() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        let x = b.int_imm(DataType::UInt(8), 3);
        let y = b.int_imm(DataType::UInt(16), 4);
        let sum = b.binary(BinOp::Add, x, y);
        let prod = b.binary(BinOp::Mul, x, y);
        let cmp = b.binary(BinOp::Lt, x, y);
        assert_eq!(sys.exprs[sum].dtype, Some(DataType::UInt(16)));
        assert_eq!(sys.exprs[prod].dtype, Some(DataType::UInt(24)));
        assert_eq!(sys.exprs[cmp].dtype, Some(DataType::bit()));
    }

    #[test]
    fn slice_and_concat_widths() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        let x = b.int_imm(DataType::UInt(32), 0xdead);
        let hi = b.slice(x, 16, 31);
        let lo = b.slice(x, 0, 15);
        let back = b.concat(hi, lo);
        assert_eq!(sys.exprs[hi].dtype, Some(DataType::Bits(16)));
        assert_eq!(sys.exprs[back].dtype, Some(DataType::Bits(32)));
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn slice_out_of_range_rejected() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        let x = b.int_imm(DataType::UInt(8), 1);
        b.slice(x, 0, 8);
    }

    #[test]
    #[should_panic(expected = "wider than 64 bits")]
    fn wide_one_hot_rejected() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        let c = b.int_imm(DataType::UInt(64), 1);
        let c = b.cast(CastKind::ZExt, c, DataType::UInt(65));
        let arm = b.int_imm(DataType::UInt(8), 0);
        let arms = vec![arm; 65];
        b.select1hot(c, &arms);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_immediate_rejected() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, m);
        b.int_imm(DataType::UInt(4), 16);
    }

    #[test]
    fn pop_all_ports_waits_then_pops() {
        let mut sys = System::new("t");
        let m = sys.add_event_module("Adder");
        sys.add_port(m, "a", DataType::Int(32));
        sys.add_port(m, "b", DataType::Int(32));
        let mut b = BodyBuilder::new(&mut sys, m);
        let popped = b.pop_all_ports();
        drop(b);
        assert_eq!(popped.len(), 2);
        // valid(a), valid(b), and(a,b), wait_until, pop(a), pop(b)
        let root = sys.modules[m].body;
        assert_eq!(sys.blocks[root].stmts.len(), 6);
    }

    #[test]
    #[should_panic(expected = "does not belong to the callee")]
    fn bind_checks_port_ownership() {
        let mut sys = System::new("t");
        let adder = sys.add_event_module("Adder");
        let a = sys.add_port(adder, "a", DataType::Int(32));
        let other = sys.add_event_module("Other");
        let mut b = BodyBuilder::new(&mut sys, other);
        let v = b.int_imm(DataType::Int(32), 1);
        b.bind(other, &[(a, v)]);
    }
}
