//! Expression nodes.
//!
//! [`ExprKind`] is a closed enum with one variant per expression kind; every
//! consumer matches it exhaustively, so adding a kind forces every backend
//! to handle it. Value operands are [`ExprId`]s into the owning system's
//! expression arena; structural references (ports, arrays, wires, modules)
//! use their own ID types.

use crate::dtype::DataType;
use crate::ids::{ArrayId, ExprId, ModuleId, PortId, WireId};
use pulsar_common::Ident;
use serde::{Deserialize, Serialize};

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Mod,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Left shift.
    Shl,
    /// Right shift (arithmetic when the left operand is signed).
    Shr,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl BinOp {
    /// The Rust surface syntax for this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    /// Returns `true` for comparison operators (result is one bit wide and
    /// operands are compared at the left operand's width).
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Flip,
}

impl UnOp {
    /// The Rust surface syntax for this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Flip => "!",
        }
    }
}

/// The flavor of a type cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    /// Zero-extension (or truncation) to the target width.
    ZExt,
    /// Sign-extension to the target width.
    SExt,
    /// Reinterpretation of the raw bits as the target type.
    Bitcast,
}

/// One argument bound to a callee port by a [`ExprKind::Bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundArg {
    /// The callee FIFO port receiving the value.
    pub port: PortId,
    /// The value pushed when the call fires.
    pub value: ExprId,
}

/// An expression kind. Closed: every backend matches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// An integer immediate; the node's `dtype` gives its width.
    IntImm {
        /// The immediate value, zero-extended into 64 bits.
        value: u64,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: ExprId,
        /// Right operand.
        rhs: ExprId,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnOp,
        /// The operand.
        x: ExprId,
    },
    /// Bit extraction of `[lo, hi]` inclusive.
    Slice {
        /// The sliced value.
        x: ExprId,
        /// Lowest extracted bit.
        lo: u32,
        /// Highest extracted bit.
        hi: u32,
    },
    /// Bit concatenation; `msb` occupies the high bits.
    Concat {
        /// High part.
        msb: ExprId,
        /// Low part.
        lsb: ExprId,
    },
    /// Two-way mux.
    Select {
        /// One-bit condition.
        cond: ExprId,
        /// Value when the condition holds.
        then_value: ExprId,
        /// Value otherwise.
        else_value: ExprId,
    },
    /// N-way one-hot mux; exactly one bit of `cond` must be set.
    Select1Hot {
        /// One-hot condition, bit *i* selects `arms[i]`.
        cond: ExprId,
        /// Candidate values, low bit first.
        arms: Vec<ExprId>,
    },
    /// A width/signedness cast; the node's `dtype` is the target type.
    Cast {
        /// The cast flavor.
        kind: CastKind,
        /// The value being cast.
        x: ExprId,
    },
    /// Read of a committed array element.
    ArrayRead {
        /// The array.
        array: ArrayId,
        /// Element index.
        idx: ExprId,
    },
    /// Staged write of an array element, committed at the tick boundary.
    ArrayWrite {
        /// The array.
        array: ArrayId,
        /// Element index.
        idx: ExprId,
        /// The value written.
        value: ExprId,
    },
    /// Staged pop yielding the FIFO front; suspends the module when empty.
    FifoPop {
        /// The popped port.
        port: PortId,
    },
    /// Staged push of a value into a FIFO.
    FifoPush {
        /// The pushed port.
        port: PortId,
        /// The pushed value.
        value: ExprId,
    },
    /// Non-destructive read of the FIFO front.
    FifoPeek {
        /// The peeked port.
        port: PortId,
    },
    /// `true` when the FIFO is non-empty.
    FifoValid {
        /// The queried port.
        port: PortId,
    },
    /// `true` when an exposed expression's cached value is present.
    ValueValid {
        /// The exposed expression.
        value: ExprId,
    },
    /// `true` when the module fired in the current cycle.
    ModuleTriggered {
        /// The queried module.
        module: ModuleId,
    },
    /// A call binding: callee plus per-port argument values.
    Bind {
        /// The called module.
        callee: ModuleId,
        /// The bound arguments.
        args: Vec<BoundArg>,
    },
    /// Fires a bound call: stages the argument pushes and queues the
    /// callee's activation event for the next cycle.
    AsyncCall {
        /// The [`ExprKind::Bind`] being fired.
        bind: ExprId,
    },
    /// Drives an input wire of an externally-implemented module.
    WireAssign {
        /// The driven wire.
        wire: WireId,
        /// The driven value.
        value: ExprId,
    },
    /// Observes an output wire of an externally-implemented module.
    WireRead {
        /// The observed wire.
        wire: WireId,
    },
    /// A formatted simulation log line, stamped with the current cycle.
    Log {
        /// The format string (interned raw).
        format: Ident,
        /// The formatted values.
        args: Vec<ExprId>,
    },
    /// Suspends the module for this cycle unless the condition holds.
    WaitUntil {
        /// The gating condition.
        cond: ExprId,
    },
    /// Fatal runtime check.
    Assert {
        /// The asserted condition.
        cond: ExprId,
    },
    /// Terminates the whole simulation process.
    Finish,
    /// Ordering hint; generates no code.
    Barrier {
        /// The value whose computation is fenced.
        token: ExprId,
    },
    /// Direct write into the memory model's backing array.
    MemWrite {
        /// The backing array.
        array: ArrayId,
        /// Element index.
        idx: ExprId,
        /// The value written.
        value: ExprId,
    },
    /// Issues a read request to the memory-timing model.
    SendReadRequest {
        /// The memory module.
        mem: ModuleId,
        /// The request address.
        addr: ExprId,
    },
    /// Issues a write request to the memory-timing model.
    SendWriteRequest {
        /// The memory module.
        mem: ModuleId,
        /// The request address.
        addr: ExprId,
        /// Write enable.
        we: ExprId,
    },
    /// Declares which FIFO receives memory responses.
    UseDram {
        /// The response port.
        port: PortId,
    },
    /// `true` when a memory response is waiting.
    HasMemResp {
        /// The memory module.
        mem: ModuleId,
    },
    /// The front memory response payload.
    MemResp {
        /// The memory module.
        mem: ModuleId,
    },
}

impl ExprKind {
    /// Collects the value operands (nested [`ExprId`]s) of this node.
    ///
    /// Structural references (ports, arrays, wires, modules) are not value
    /// operands and are not returned.
    pub fn value_operands(&self) -> Vec<ExprId> {
        match self {
            ExprKind::IntImm { .. }
            | ExprKind::FifoPop { .. }
            | ExprKind::FifoPeek { .. }
            | ExprKind::FifoValid { .. }
            | ExprKind::ModuleTriggered { .. }
            | ExprKind::WireRead { .. }
            | ExprKind::Finish
            | ExprKind::UseDram { .. }
            | ExprKind::HasMemResp { .. }
            | ExprKind::MemResp { .. } => Vec::new(),
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Unary { x, .. } | ExprKind::Cast { x, .. } | ExprKind::Slice { x, .. } => {
                vec![*x]
            }
            ExprKind::Concat { msb, lsb } => vec![*msb, *lsb],
            ExprKind::Select {
                cond,
                then_value,
                else_value,
            } => vec![*cond, *then_value, *else_value],
            ExprKind::Select1Hot { cond, arms } => {
                let mut ops = vec![*cond];
                ops.extend(arms.iter().copied());
                ops
            }
            ExprKind::ArrayRead { idx, .. } => vec![*idx],
            ExprKind::ArrayWrite { idx, value, .. } | ExprKind::MemWrite { idx, value, .. } => {
                vec![*idx, *value]
            }
            ExprKind::FifoPush { value, .. } | ExprKind::WireAssign { value, .. } => vec![*value],
            ExprKind::ValueValid { value } => vec![*value],
            ExprKind::Bind { args, .. } => args.iter().map(|a| a.value).collect(),
            ExprKind::AsyncCall { bind } => vec![*bind],
            ExprKind::Log { args, .. } => args.clone(),
            ExprKind::WaitUntil { cond } | ExprKind::Assert { cond } => vec![*cond],
            ExprKind::Barrier { token } => vec![*token],
            ExprKind::SendReadRequest { addr, .. } => vec![*addr],
            ExprKind::SendWriteRequest { addr, we, .. } => vec![*addr, *we],
        }
    }
}

/// An expression node: kind, result type, owner, and generated value name.
#[derive(Debug, Clone)]
pub struct Expr {
    /// What this expression computes.
    pub kind: ExprKind,
    /// The result type; `None` for pure side-effect nodes.
    pub dtype: Option<DataType>,
    /// The module whose body contains this expression.
    pub module: ModuleId,
    /// The local variable name this expression binds to in generated code.
    pub name: Ident,
}

impl Expr {
    /// Returns `true` when this expression produces a value.
    pub fn is_valued(&self) -> bool {
        self.dtype.is_some()
    }
}

/// Computes the result type of a binary operation from its operand types.
///
/// Addition widens to the wider operand; subtraction, division, and modulo
/// keep the left width; multiplication sums the widths; shifts keep the left
/// width as raw bits; comparisons are one bit; bitwise operators take the
/// wider width as raw bits.
pub fn binary_result_type(op: BinOp, lhs: DataType, rhs: DataType) -> DataType {
    match op {
        BinOp::Add => lhs.with_bits(lhs.bits().max(rhs.bits())),
        BinOp::Sub | BinOp::Div | BinOp::Mod => lhs,
        BinOp::Mul => lhs.with_bits(lhs.bits() + rhs.bits()),
        BinOp::Shl | BinOp::Shr => DataType::Bits(lhs.bits()),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => DataType::bit(),
        BinOp::And | BinOp::Or | BinOp::Xor => DataType::Bits(lhs.bits().max(rhs.bits())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_widens_to_max() {
        let t = binary_result_type(BinOp::Add, DataType::UInt(8), DataType::UInt(32));
        assert_eq!(t, DataType::UInt(32));
    }

    #[test]
    fn mul_sums_widths() {
        let t = binary_result_type(BinOp::Mul, DataType::Int(16), DataType::Int(16));
        assert_eq!(t, DataType::Int(32));
    }

    #[test]
    fn sub_keeps_lhs() {
        let t = binary_result_type(BinOp::Sub, DataType::UInt(12), DataType::UInt(4));
        assert_eq!(t, DataType::UInt(12));
    }

    #[test]
    fn comparison_is_one_bit() {
        let t = binary_result_type(BinOp::Lt, DataType::Int(32), DataType::Int(32));
        assert_eq!(t, DataType::bit());
    }

    #[test]
    fn shift_is_raw_bits() {
        let t = binary_result_type(BinOp::Shr, DataType::Int(32), DataType::UInt(5));
        assert_eq!(t, DataType::Bits(32));
    }

    #[test]
    fn value_operands_of_select1hot() {
        let k = ExprKind::Select1Hot {
            cond: ExprId::from_raw(0),
            arms: vec![ExprId::from_raw(1), ExprId::from_raw(2)],
        };
        let ops = k.value_operands();
        assert_eq!(ops.len(), 3);
    }

    #[test]
    fn value_operands_skip_structural_refs() {
        let k = ExprKind::FifoPop {
            port: PortId::from_raw(3),
        };
        assert!(k.value_operands().is_empty());
    }
}
