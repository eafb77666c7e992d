//! Statement blocks.
//!
//! A module body is a tree of blocks: the root is plain, and nested blocks
//! are either conditional (emitted under a runtime `if`) or cycle-gated
//! (emitted only during one stamped simulation step, as testbenches do).

use crate::ids::{BlockId, ExprId, ModuleId};
use serde::{Deserialize, Serialize};

/// How a block's statements are gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Unconditional sequence.
    Plain,
    /// Runs only when the condition evaluates true.
    Cond {
        /// The one-bit gating condition.
        cond: ExprId,
    },
    /// Runs only during the given cycle.
    Cycled {
        /// The gating cycle number.
        cycle: usize,
    },
}

/// One statement in a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    /// An expression evaluated for its value and/or side effect.
    Expr(ExprId),
    /// A nested block.
    Block(BlockId),
}

/// An ordered statement sequence owned by one module.
#[derive(Debug, Clone)]
pub struct Block {
    /// The gating kind.
    pub kind: BlockKind,
    /// The statements in program order.
    pub stmts: Vec<Stmt>,
    /// The owning module.
    pub module: ModuleId,
}
