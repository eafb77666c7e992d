//! Static analyses over a frozen system.
//!
//! Code generation consumes three queries: which expressions are used
//! outside their owning module (the *exposure* set), which modules feed a
//! dependency-driven module (its upstreams), and the topological evaluation
//! order of all dependency-driven modules. A cycle among dependency-driven
//! modules is a static IR error.

use crate::block::BlockKind;
use crate::expr::ExprKind;
use crate::ids::{ExprId, ModuleId};
use crate::system::System;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, BTreeSet};

/// Static IR errors detected by analysis.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// The dependency-driven module graph contains a cycle.
    #[error("dependency cycle through downstream module {module}")]
    DependencyCycle {
        /// A module on the cycle.
        module: String,
    },
}

/// Collects, per expression, the set of modules that read it, block
/// conditions included.
fn reader_map(sys: &System) -> BTreeMap<ExprId, BTreeSet<ModuleId>> {
    let mut readers: BTreeMap<ExprId, BTreeSet<ModuleId>> = BTreeMap::new();
    for (_, expr) in sys.exprs.iter() {
        for operand in expr.kind.value_operands() {
            readers.entry(operand).or_default().insert(expr.module);
        }
    }
    for (_, block) in sys.blocks.iter() {
        if let BlockKind::Cond { cond } = block.kind {
            readers.entry(cond).or_default().insert(block.module);
        }
    }
    readers
}

/// Returns every expression whose value is read outside its owning module.
///
/// These are the expressions that need a cached value-with-validity slot in
/// the generated simulator state. Pushes and binds are never exposed
/// themselves (they carry no value), but a value they forward across a
/// module boundary is.
pub fn externally_used_exprs(sys: &System) -> BTreeSet<ExprId> {
    let readers = reader_map(sys);
    let mut exposed = BTreeSet::new();
    for (expr_id, modules) in readers {
        let expr = &sys.exprs[expr_id];
        if matches!(expr.kind, ExprKind::FifoPush { .. } | ExprKind::Bind { .. }) {
            continue;
        }
        if modules.iter().any(|&m| m != expr.module) {
            exposed.insert(expr_id);
        }
    }
    exposed
}

/// Returns `true` when the expression's value crosses a module boundary.
pub fn expr_externally_used(sys: &System, expr: ExprId) -> bool {
    externally_used_exprs(sys).contains(&expr)
}

/// The distinct producer modules feeding a dependency-driven module.
///
/// A producer is the owner of any expression this module reads, including
/// conditions of its nested blocks.
pub fn upstreams_of(sys: &System, module: ModuleId) -> Vec<ModuleId> {
    let mut upstream = BTreeSet::new();
    for (_, expr) in sys.exprs.iter() {
        if expr.module != module {
            continue;
        }
        for operand in expr.kind.value_operands() {
            let owner = sys.exprs[operand].module;
            if owner != module {
                upstream.insert(owner);
            }
        }
    }
    for (_, block) in sys.blocks.iter() {
        if block.module != module {
            continue;
        }
        if let BlockKind::Cond { cond } = block.kind {
            let owner = sys.exprs[cond].module;
            if owner != module {
                upstream.insert(owner);
            }
        }
    }
    upstream.into_iter().collect()
}

/// Orders all dependency-driven modules producer-before-consumer.
///
/// Only edges between dependency-driven modules constrain the order;
/// event-driven producers always run earlier in the cycle. A cycle among
/// dependency-driven modules is rejected.
pub fn downstream_topo_order(sys: &System) -> Result<Vec<ModuleId>, IrError> {
    let downstreams = sys.downstream_modules();
    let mut graph = DiGraph::<ModuleId, ()>::new();
    let mut nodes = BTreeMap::new();
    for &m in &downstreams {
        nodes.insert(m, graph.add_node(m));
    }
    for &m in &downstreams {
        for upstream in upstreams_of(sys, m) {
            if let Some(&from) = nodes.get(&upstream) {
                graph.add_edge(from, nodes[&m], ());
            }
        }
    }
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|n| graph[n]).collect()),
        Err(cycle) => Err(IrError::DependencyCycle {
            module: sys.module_name(graph[cycle.node_id()]).to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BodyBuilder;
    use crate::dtype::DataType;
    use crate::expr::BinOp;

    /// driver (event) -> stage1 (downstream) -> stage2 (downstream)
    fn chained_system() -> (System, ModuleId, ModuleId, ModuleId, ExprId, ExprId) {
        let mut sys = System::new("chain");
        let driver = sys.add_event_module("Driver");
        let stage1 = sys.add_downstream_module("Stage1");
        let stage2 = sys.add_downstream_module("Stage2");

        let mut b = BodyBuilder::new(&mut sys, driver);
        let v = b.int_imm(DataType::UInt(32), 5);
        drop(b);

        let mut b = BodyBuilder::new(&mut sys, stage1);
        let one = b.int_imm(DataType::UInt(32), 1);
        let mid = b.binary(BinOp::Add, v, one);
        drop(b);

        let mut b = BodyBuilder::new(&mut sys, stage2);
        let two = b.int_imm(DataType::UInt(32), 2);
        b.binary(BinOp::Add, mid, two);
        drop(b);

        (sys, driver, stage1, stage2, v, mid)
    }

    #[test]
    fn cross_module_reads_are_exposed() {
        let (sys, _, _, _, v, mid) = chained_system();
        let exposed = externally_used_exprs(&sys);
        assert!(exposed.contains(&v));
        assert!(exposed.contains(&mid));
    }

    #[test]
    fn local_reads_are_not_exposed() {
        let (sys, _, _, _, _, _) = chained_system();
        let exposed = externally_used_exprs(&sys);
        // The immediates feeding local adds never leave their modules.
        let locals: Vec<ExprId> = sys
            .exprs
            .iter()
            .filter(|(_, e)| matches!(e.kind, ExprKind::IntImm { value: 1 | 2 }))
            .map(|(id, _)| id)
            .collect();
        for id in locals {
            assert!(!exposed.contains(&id));
        }
    }

    #[test]
    fn upstreams_follow_operand_owners() {
        let (sys, driver, stage1, stage2, _, _) = chained_system();
        assert_eq!(upstreams_of(&sys, stage1), vec![driver]);
        assert_eq!(upstreams_of(&sys, stage2), vec![stage1]);
    }

    #[test]
    fn topo_order_puts_producers_first() {
        let (sys, _, stage1, stage2, _, _) = chained_system();
        let order = downstream_topo_order(&sys).unwrap();
        let i1 = order.iter().position(|&m| m == stage1).unwrap();
        let i2 = order.iter().position(|&m| m == stage2).unwrap();
        assert!(i1 < i2);
    }

    #[test]
    fn push_of_a_local_value_exposes_nothing() {
        let mut sys = System::new("push");
        let adder = sys.add_event_module("Adder");
        let a = sys.add_port(adder, "a", DataType::UInt(8));
        let driver = sys.add_event_module("Driver");
        let mut b = BodyBuilder::new(&mut sys, driver);
        let v = b.int_imm(DataType::UInt(8), 7);
        b.fifo_push(a, v);
        drop(b);
        // The pushed value is produced and consumed inside Driver; the push
        // itself carries no value.
        assert!(externally_used_exprs(&sys).is_empty());
    }

    #[test]
    fn push_of_a_foreign_value_exposes_it() {
        let mut sys = System::new("push");
        let producer = sys.add_event_module("Producer");
        let mut b = BodyBuilder::new(&mut sys, producer);
        let x = b.int_imm(DataType::UInt(8), 1);
        let v = b.binary(BinOp::Add, x, x);
        drop(b);

        let adder = sys.add_event_module("Adder");
        let a = sys.add_port(adder, "a", DataType::UInt(8));
        let forwarder = sys.add_event_module("Forwarder");
        let mut b = BodyBuilder::new(&mut sys, forwarder);
        b.fifo_push(a, v);
        drop(b);

        // Forwarder reads Producer's value to push it: the value crosses a
        // module boundary and needs a cached slot.
        assert!(externally_used_exprs(&sys).contains(&v));
    }

    #[test]
    fn cond_block_reads_count_as_uses() {
        let mut sys = System::new("cond");
        let driver = sys.add_event_module("Driver");
        let sink = sys.add_downstream_module("Sink");

        let mut b = BodyBuilder::new(&mut sys, driver);
        let flag = b.int_imm(DataType::bit(), 1);
        drop(b);

        let mut b = BodyBuilder::new(&mut sys, sink);
        b.cond(flag, |b| {
            b.finish();
        });
        drop(b);

        assert!(externally_used_exprs(&sys).contains(&flag));
        assert_eq!(upstreams_of(&sys, sink), vec![driver]);
    }

    #[test]
    fn downstream_cycle_is_rejected() {
        let mut sys = System::new("cyc");
        let a = sys.add_downstream_module("A");
        let b_mod = sys.add_downstream_module("B");

        // A reads a value from B and vice versa.
        let mut b = BodyBuilder::new(&mut sys, a);
        let va = b.int_imm(DataType::UInt(8), 1);
        drop(b);
        let mut b = BodyBuilder::new(&mut sys, b_mod);
        let one = b.int_imm(DataType::UInt(8), 1);
        let vb = b.binary(BinOp::Add, va, one);
        drop(b);
        let mut b = BodyBuilder::new(&mut sys, a);
        let two = b.int_imm(DataType::UInt(8), 2);
        b.binary(BinOp::Add, vb, two);
        drop(b);

        assert!(matches!(
            downstream_topo_order(&sys),
            Err(IrError::DependencyCycle { .. })
        ));
    }
}
