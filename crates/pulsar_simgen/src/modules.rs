//! Module and block emission.
//!
//! Every module lowers to one step function `pub fn <Name>(sim) -> bool` in
//! its own generated file. Failure means "could not complete this cycle":
//! suspension points lower to early returns, so statements after the
//! failure point never execute and the module's cycle evaluation stays
//! atomic. Conditional blocks nest a runtime `if`; cycle-gated blocks
//! compare against the current cycle.

use crate::error::SimGenError;
use crate::lower_expr::{ffi_storage_type, lower_expr, storage_type, Lowered, LowerCtx};
use crate::names;
use crate::render::{render_expr, CodeWriter, RExpr, RStmt, RType};
use pulsar_ir::{BlockId, BlockKind, ExprId, ModuleId, Stmt, System, WireDirection};

/// Returns `true` when an externally-implemented module is driven directly:
/// some caller pushes into its companion FIFO ports, so the emitter owns
/// the pump-through-the-model step function. Without such callers the
/// block is a passthrough stub whose behavior lives in its consumers' wire
/// glue.
pub fn is_directly_driven(sys: &System, module: ModuleId) -> bool {
    if !sys.modules[module].is_external() {
        return false;
    }
    sys.exprs.values().any(|expr| match &expr.kind {
        pulsar_ir::ExprKind::FifoPush { port, .. } => sys.ports[*port].module == module,
        pulsar_ir::ExprKind::Bind { args, .. } => {
            args.iter().any(|a| sys.ports[a.port].module == module)
        }
        _ => false,
    })
}

fn emit_expr_stmt(ctx: &LowerCtx<'_>, w: &mut CodeWriter, expr_id: ExprId) -> Result<(), SimGenError> {
    match lower_expr(ctx, expr_id)? {
        Lowered::Value(value) => {
            let name = ctx.sys.expr_name(expr_id).to_string();
            w.stmt(&RStmt::Let {
                name: name.clone(),
                value,
            });
            if ctx.exposed.contains(&expr_id) {
                w.stmt(&RStmt::Assign {
                    target: RExpr::path(format!("sim.{}", names::value_field(ctx.sys, expr_id))),
                    value: RExpr::Call {
                        callee: "Some".to_string(),
                        args: vec![RExpr::path(name).method("clone", vec![])],
                    },
                });
            }
        }
        Lowered::Stmts(stmts) => w.stmts(&stmts),
        Lowered::Empty => {}
    }
    Ok(())
}

fn emit_block(ctx: &LowerCtx<'_>, w: &mut CodeWriter, block: BlockId) -> Result<(), SimGenError> {
    let b = &ctx.sys.blocks[block];
    let (kind, module) = (b.kind, b.module);
    let stmts = b.stmts.clone();
    match kind {
        BlockKind::Plain => emit_stmts(ctx, w, &stmts)?,
        BlockKind::Cond { cond } => {
            let guard = crate::lower_expr::rval(ctx, module, cond).cast_to(RType::Bool);
            w.line(&format!("if {} {{", render_expr(&guard)));
            w.try_indented(|w| emit_stmts(ctx, w, &stmts))?;
            w.line("}");
        }
        BlockKind::Cycled { cycle } => {
            w.line(&format!("if sim.stamp / 100 == {cycle} {{"));
            w.try_indented(|w| emit_stmts(ctx, w, &stmts))?;
            w.line("}");
        }
    }
    Ok(())
}

fn emit_stmts(ctx: &LowerCtx<'_>, w: &mut CodeWriter, stmts: &[Stmt]) -> Result<(), SimGenError> {
    for stmt in stmts {
        match stmt {
            Stmt::Expr(e) => emit_expr_stmt(ctx, w, *e)?,
            Stmt::Block(b) => emit_block(ctx, w, *b)?,
        }
    }
    Ok(())
}

fn file_header(w: &mut CodeWriter, name: &str) {
    w.line(&format!("//! Generated step function for `{name}`."));
    w.line("#![allow(unused)]");
    w.blank();
    w.line("use crate::simulator::Simulator;");
    w.line("use pulsar_runtime::num_bigint::{BigInt, BigUint};");
    w.line("use pulsar_runtime::{commit_stamp, next_cycle_stamp, ValueCastTo, WriteRecord};");
    w.blank();
}

/// Emits the generated source file for one ordinary module.
pub fn emit_module_file(ctx: &LowerCtx<'_>, module: ModuleId) -> Result<String, SimGenError> {
    let name = ctx.sys.module_name(module).to_string();
    let mut w = CodeWriter::new();
    file_header(&mut w, &name);
    w.line(&format!("pub fn {name}(sim: &mut Simulator) -> bool {{"));
    w.try_indented(|w| {
        emit_block(ctx, w, ctx.sys.modules[module].body)?;
        w.line("true");
        Ok::<(), SimGenError>(())
    })?;
    w.line("}");
    Ok(w.finish())
}

/// Emits the step function of a directly-driven external module: pop one
/// value per input wire, feed the compiled model, evaluate, read every
/// output back, and stage the output pushes.
pub fn emit_external_drive_file(ctx: &LowerCtx<'_>, module: ModuleId) -> Result<String, SimGenError> {
    let sys = ctx.sys;
    let name = sys.module_name(module).to_string();
    let spec = sys.modules[module]
        .external
        .as_ref()
        .expect("directly driven modules are external");
    let handle = names::handle_field(sys, module);

    let mut w = CodeWriter::new();
    file_header(&mut w, &name);
    w.line(&format!("pub fn {name}(sim: &mut Simulator) -> bool {{"));

    let mut failed = None;
    w.indented(|w| {
        w.stmt(&RStmt::Let {
            name: "stamp".to_string(),
            value: RExpr::Call {
                callee: "commit_stamp".to_string(),
                args: vec![RExpr::path("sim.stamp")],
            },
        });

        // Pull one value per input wire; any empty queue suspends.
        for &wire in &spec.wires {
            let wi = &sys.wires[wire];
            if wi.direction != WireDirection::Input {
                continue;
            }
            let wire_name = sys.resolve(wi.name).to_string();
            let port = sys.modules[module]
                .ports()
                .iter()
                .copied()
                .find(|&p| sys.ports[p].name == wi.name)
                .expect("wires carry companion ports");
            w.stmt(&RStmt::Let {
                name: format!("in_{wire_name}"),
                value: RExpr::PopOrSuspend {
                    queue: Box::new(RExpr::path(format!(
                        "sim.{}",
                        names::fifo_field(sys, port)
                    ))),
                    stamp: Box::new(RExpr::path("stamp")),
                },
            });
            let raw = match ffi_storage_type(
                wi.dtype.bits(),
                wi.dtype.is_signed(),
                &format!("wire {wire_name}"),
            ) {
                Ok(raw) => raw,
                Err(e) => {
                    failed = Some(e);
                    return;
                }
            };
            w.stmt(&RStmt::Expr(RExpr::path(format!("sim.{handle}")).method(
                format!("set_{wire_name}"),
                vec![RExpr::path(format!("in_{wire_name}")).cast_to(RType::Prim(raw))],
            )));
        }

        w.stmt(&RStmt::Expr(
            RExpr::path(format!("sim.{handle}")).method("eval", vec![]),
        ));
        w.stmt(&RStmt::Assign {
            target: RExpr::path(format!("sim.{}", names::dirty_field(sys, module))),
            value: RExpr::lit("false"),
        });

        // Read every output and stage it into the companion queue.
        for &wire in &spec.wires {
            let wi = &sys.wires[wire];
            if wi.direction != WireDirection::Output {
                continue;
            }
            let wire_name = sys.resolve(wi.name).to_string();
            let port = sys.modules[module]
                .ports()
                .iter()
                .copied()
                .find(|&p| sys.ports[p].name == wi.name)
                .expect("wires carry companion ports");
            let elem = storage_type(wi.dtype);
            w.stmt(&RStmt::Let {
                name: format!("out_{wire_name}"),
                value: RExpr::path(format!("sim.{handle}"))
                    .method(format!("get_{wire_name}"), vec![])
                    .cast_to(elem),
            });
            w.stmt(&RStmt::Expr(
                RExpr::path(format!("sim.{}", names::fifo_field(sys, port))).method(
                    "push",
                    vec![
                        RExpr::path("stamp"),
                        RExpr::path(format!("out_{wire_name}")),
                        RExpr::Str(name.clone()),
                    ],
                ),
            ));
        }
        w.line("true");
    });
    if let Some(e) = failed {
        return Err(e);
    }
    w.line("}");
    Ok(w.finish())
}

/// Emits `src/modules/mod.rs` declaring one sub-module per generated file.
pub fn emit_mod_rs(module_names: &[String]) -> String {
    let mut w = CodeWriter::new();
    w.line("//! Generated per-module step functions.");
    w.line("#![allow(non_snake_case)]");
    w.blank();
    for name in module_names {
        w.line(&format!("pub mod {name};"));
    }
    w.finish()
}
