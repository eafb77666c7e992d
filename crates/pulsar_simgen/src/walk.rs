//! Program-order traversal of module bodies.

use pulsar_ir::{BlockId, ExprId, ModuleId, Stmt, System};

fn walk_block(sys: &System, block: BlockId, out: &mut Vec<ExprId>) {
    for stmt in &sys.blocks[block].stmts {
        match stmt {
            Stmt::Expr(e) => out.push(*e),
            Stmt::Block(b) => walk_block(sys, *b, out),
        }
    }
}

/// Every expression in a module's body, in program order, conditional and
/// cycle-gated sub-blocks included.
pub fn module_exprs(sys: &System, module: ModuleId) -> Vec<ExprId> {
    let mut out = Vec::new();
    walk_block(sys, sys.modules[module].body, &mut out);
    out
}
