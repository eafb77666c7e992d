//! Expression lowering.
//!
//! Maps one IR expression to render-tree code under explicit bit-width
//! semantics: operands are cast to the result's storage type before the
//! operator applies (comparisons use the left operand's width), signed
//! right shifts reinterpret through signed storage, and anything wider
//! than 64 bits routes through `BigUint`/`BigInt`. Mutations of FIFOs and
//! arrays are staged with a `+50` commit stamp, never applied in place.

use crate::callbacks::CallbackInfo;
use crate::error::SimGenError;
use crate::names;
use crate::port_map::{WritePortArbiter, Writer};
use crate::render::{RExpr, RStmt, RType};
use pulsar_ir::{
    BinOp, CastKind, DataType, ExprId, ExprKind, ModuleId, System, UnOp, WireDirection,
};
use std::collections::BTreeSet;

/// Shared, read-only context for lowering one system.
pub struct LowerCtx<'a> {
    /// The frozen system.
    pub sys: &'a System,
    /// Write-port assignments from the arbitration pre-pass.
    pub arbiter: &'a WritePortArbiter,
    /// Expressions whose values need a cached simulator-state slot.
    pub exposed: &'a BTreeSet<ExprId>,
    /// Memory-intrinsic metadata.
    pub callbacks: CallbackInfo,
}

/// The result of lowering one expression.
pub enum Lowered {
    /// A value; the module emitter binds it with `let <name> = ...`.
    Value(RExpr),
    /// Pure side-effect statements.
    Stmts(Vec<RStmt>),
    /// Nothing to emit (binds, metadata intrinsics).
    Empty,
}

/// The storage type carrying values of the given IR type in generated code.
pub fn storage_type(dtype: DataType) -> RType {
    let bits = dtype.bits();
    if dtype.is_signed() {
        match bits {
            0..=8 => RType::Prim("i8"),
            9..=16 => RType::Prim("i16"),
            17..=32 => RType::Prim("i32"),
            33..=64 => RType::Prim("i64"),
            _ => RType::BigInt,
        }
    } else {
        match bits {
            1 => RType::Bool,
            0..=8 => RType::Prim("u8"),
            9..=16 => RType::Prim("u16"),
            17..=32 => RType::Prim("u32"),
            33..=64 => RType::Prim("u64"),
            _ => RType::BigUint,
        }
    }
}

/// Renders an integer immediate of the given type.
pub fn int_literal(dtype: DataType, value: u64) -> RExpr {
    let bits = dtype.bits();
    match storage_type(dtype) {
        RType::Bool => RExpr::lit(if value != 0 { "true" } else { "false" }),
        RType::Prim(prim) => {
            if dtype.is_signed() {
                // Reinterpret the raw two's-complement bits at the IR width.
                let shift = 64 - bits;
                let signed = ((value << shift) as i64) >> shift;
                RExpr::lit(format!("{signed}{prim}"))
            } else {
                RExpr::lit(format!("{value}{prim}"))
            }
        }
        big => RExpr::lit(format!("{value}u64")).cast_to(big),
    }
}

fn dtype_of(ctx: &LowerCtx<'_>, expr: ExprId) -> DataType {
    ctx.sys.exprs[expr]
        .dtype
        .expect("operand expressions always carry a value")
}

/// References an operand from inside `user`'s step function: immediates
/// inline, same-module values by local name, cross-module values through
/// their cached simulator-state slot.
pub fn rval(ctx: &LowerCtx<'_>, user: ModuleId, operand: ExprId) -> RExpr {
    let expr = &ctx.sys.exprs[operand];
    if let ExprKind::IntImm { value } = expr.kind {
        return int_literal(expr.dtype.expect("immediates are typed"), value);
    }
    let name = ctx.sys.expr_name(operand);
    if expr.module == user {
        RExpr::path(name)
    } else {
        RExpr::path(format!("sim.{}", names::value_field(ctx.sys, operand)))
            .method("clone", vec![])
            .method(
                "expect",
                vec![RExpr::Str(format!("{name} has no value this cycle"))],
            )
    }
}

fn commit_stamp_expr() -> RExpr {
    RExpr::Call {
        callee: "commit_stamp".to_string(),
        args: vec![RExpr::path("sim.stamp")],
    }
}

fn next_cycle_stamp_expr() -> RExpr {
    RExpr::Call {
        callee: "next_cycle_stamp".to_string(),
        args: vec![RExpr::path("sim.stamp")],
    }
}

fn index_usize(value: RExpr) -> RExpr {
    RExpr::AsUsize(Box::new(value.cast_to(RType::Prim("u64"))))
}

/// The FFI storage type of a wire, per the external bridge's contract.
/// Wires wider than 64 bits cannot cross the C boundary.
pub fn ffi_storage_type(bits: u32, signed: bool, context: &str) -> Result<&'static str, SimGenError> {
    let ty = match (bits, signed) {
        (1..=8, false) => "u8",
        (9..=16, false) => "u16",
        (17..=32, false) => "u32",
        (33..=64, false) => "u64",
        (1..=8, true) => "i8",
        (9..=16, true) => "i16",
        (17..=32, true) => "i32",
        (33..=64, true) => "i64",
        _ => {
            return Err(SimGenError::UnsupportedWidth {
                bits,
                context: context.to_string(),
            })
        }
    };
    Ok(ty)
}

fn lower_binary(
    ctx: &LowerCtx<'_>,
    user: ModuleId,
    op: BinOp,
    lhs: ExprId,
    rhs: ExprId,
    result: DataType,
) -> Result<RExpr, SimGenError> {
    let lhs_ty = dtype_of(ctx, lhs);
    let target = if op.is_comparison() { lhs_ty } else { result };
    let mut compute_ty = storage_type(target);

    // Arithmetic right shift: reinterpret both sides as signed first.
    if op == BinOp::Shr && lhs_ty.is_signed() {
        compute_ty = storage_type(DataType::Int(lhs_ty.bits()));
    }

    let left = rval(ctx, user, lhs).cast_to(compute_ty.clone());
    let right = if matches!(op, BinOp::Shl | BinOp::Shr) && compute_ty.is_big() {
        // Arbitrary-precision shifts take a machine-word shift amount.
        index_usize(rval(ctx, user, rhs))
    } else {
        rval(ctx, user, rhs).cast_to(compute_ty.clone())
    };

    let applied = left.bin(op.symbol(), right);
    // Comparisons are already `bool`; anything computed in a different
    // storage than the result's (the signed-shift path) casts back.
    let result_ty = storage_type(result);
    if op.is_comparison() || compute_ty == result_ty {
        Ok(applied)
    } else {
        Ok(applied.cast_to(result_ty))
    }
}

fn lower_unary(
    ctx: &LowerCtx<'_>,
    user: ModuleId,
    op: UnOp,
    x: ExprId,
    result: DataType,
) -> Result<RExpr, SimGenError> {
    let result_ty = storage_type(result);
    if result_ty.is_big() {
        return Err(SimGenError::Unsupported {
            what: "unary operator".to_string(),
            reason: "operands wider than 64 bits".to_string(),
        });
    }
    let operand = rval(ctx, user, x).cast_to(result_ty.clone());
    Ok(match op {
        UnOp::Flip => RExpr::Unary {
            op: "!",
            expr: Box::new(operand),
        },
        // Two's-complement negate; a 1-bit negate is the identity.
        UnOp::Neg => {
            if result.bits() == 1 {
                operand
            } else {
                operand.method("wrapping_neg", vec![])
            }
        }
    })
}

fn lower_slice(
    ctx: &LowerCtx<'_>,
    user: ModuleId,
    x: ExprId,
    lo: u32,
    hi: u32,
    result: DataType,
) -> RExpr {
    let width = hi - lo + 1;
    let src_big = storage_type(dtype_of(ctx, x)).is_big();
    let shifted = if src_big {
        let mask = RExpr::lit(format!("(BigUint::from(1u8) << {width}u32)"))
            .bin("-", RExpr::lit("BigUint::from(1u8)"));
        rval(ctx, user, x)
            .cast_to(RType::BigUint)
            .bin(">>", RExpr::lit(format!("{lo}u32")))
            .bin("&", mask)
    } else {
        let mask = if width >= 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        rval(ctx, user, x)
            .cast_to(RType::Prim("u64"))
            .bin(">>", RExpr::lit(format!("{lo}u32")))
            .bin("&", RExpr::lit(format!("{mask:#x}u64")))
    };
    shifted.cast_to(storage_type(result))
}

fn lower_select1hot(
    ctx: &LowerCtx<'_>,
    user: ModuleId,
    cond: ExprId,
    arms: &[ExprId],
    result: DataType,
) -> RExpr {
    let result_ty = storage_type(result);
    // Chain the arm tests low bit first; a selector that matches nothing
    // is unreachable once the one-hot assertion passed.
    let mut chain = RExpr::MacroCall {
        name: "unreachable",
        args: vec![RExpr::Str("one-hot selector matched no arm".to_string())],
    };
    for (i, &arm) in arms.iter().enumerate().rev() {
        let test = RExpr::path("onehot")
            .bin("&", RExpr::lit(format!("{:#x}u64", 1u64 << i)))
            .bin("!=", RExpr::lit("0u64"));
        chain = RExpr::Ternary {
            cond: Box::new(test),
            then_value: Box::new(rval(ctx, user, arm).cast_to(result_ty.clone())),
            else_value: Box::new(chain),
        };
    }
    RExpr::Block {
        stmts: vec![
            RStmt::Let {
                name: "onehot".to_string(),
                value: rval(ctx, user, cond).cast_to(RType::Prim("u64")),
            },
            RStmt::Expr(RExpr::MacroCall {
                name: "assert",
                args: vec![
                    RExpr::path("onehot")
                        .method("count_ones", vec![])
                        .bin("==", RExpr::lit("1u32")),
                    RExpr::Str("one-hot selector must have exactly one bit set".to_string()),
                ],
            }),
        ],
        tail: Some(Box::new(chain)),
    }
}

fn staged_array_write(
    ctx: &LowerCtx<'_>,
    user: ModuleId,
    array: pulsar_ir::ArrayId,
    idx: ExprId,
    value: ExprId,
    writer: Writer,
) -> Vec<RStmt> {
    let field = names::array_field(ctx.sys, array);
    let elem = storage_type(ctx.sys.arrays[array].scalar_ty);
    let port = ctx
        .arbiter
        .port_of(array, writer)
        .expect("arbitration pre-pass covers every writer");
    vec![
        RStmt::Let {
            name: "stamp".to_string(),
            value: commit_stamp_expr(),
        },
        RStmt::Expr(
            RExpr::path(format!("sim.{field}")).method(
                "stage_write",
                vec![RExpr::Call {
                    callee: "WriteRecord::new".to_string(),
                    args: vec![
                        RExpr::path("stamp"),
                        index_usize(rval(ctx, user, idx)),
                        rval(ctx, user, value).cast_to(elem),
                        RExpr::Str(ctx.sys.module_name(user).to_string()),
                        RExpr::lit(format!("{port}usize")),
                    ],
                }],
            ),
        ),
    ]
}

/// Lowers one expression into render-tree code.
pub fn lower_expr(ctx: &LowerCtx<'_>, expr_id: ExprId) -> Result<Lowered, SimGenError> {
    let expr = &ctx.sys.exprs[expr_id];
    let user = expr.module;
    match &expr.kind {
        ExprKind::IntImm { value } => Ok(Lowered::Value(int_literal(
            expr.dtype.expect("immediates are typed"),
            *value,
        ))),

        ExprKind::Binary { op, lhs, rhs } => Ok(Lowered::Value(lower_binary(
            ctx,
            user,
            *op,
            *lhs,
            *rhs,
            expr.dtype.expect("binary ops are typed"),
        )?)),

        ExprKind::Unary { op, x } => Ok(Lowered::Value(lower_unary(
            ctx,
            user,
            *op,
            *x,
            expr.dtype.expect("unary ops are typed"),
        )?)),

        ExprKind::Slice { x, lo, hi } => Ok(Lowered::Value(lower_slice(
            ctx,
            user,
            *x,
            *lo,
            *hi,
            expr.dtype.expect("slices are typed"),
        ))),

        ExprKind::Concat { msb, lsb } => {
            let lsb_bits = dtype_of(ctx, *lsb).bits();
            let joined = rval(ctx, user, *msb)
                .cast_to(RType::BigUint)
                .bin("<<", RExpr::lit(format!("{lsb_bits}u32")))
                .bin("|", rval(ctx, user, *lsb).cast_to(RType::BigUint));
            Ok(Lowered::Value(
                joined.cast_to(storage_type(expr.dtype.expect("concats are typed"))),
            ))
        }

        ExprKind::Select {
            cond,
            then_value,
            else_value,
        } => {
            let ty = storage_type(expr.dtype.expect("selects are typed"));
            Ok(Lowered::Value(RExpr::Ternary {
                cond: Box::new(rval(ctx, user, *cond).cast_to(RType::Bool)),
                then_value: Box::new(rval(ctx, user, *then_value).cast_to(ty.clone())),
                else_value: Box::new(rval(ctx, user, *else_value).cast_to(ty)),
            }))
        }

        ExprKind::Select1Hot { cond, arms } => Ok(Lowered::Value(lower_select1hot(
            ctx,
            user,
            *cond,
            arms,
            expr.dtype.expect("selects are typed"),
        ))),

        ExprKind::Cast { kind, x } => {
            let target = storage_type(expr.dtype.expect("casts are typed"));
            let value = match kind {
                CastKind::ZExt | CastKind::Bitcast => rval(ctx, user, *x).cast_to(target),
                CastKind::SExt => {
                    // Reinterpret at the source width as signed, then widen.
                    let src_bits = dtype_of(ctx, *x).bits();
                    rval(ctx, user, *x)
                        .cast_to(storage_type(DataType::Int(src_bits)))
                        .cast_to(target)
                }
            };
            Ok(Lowered::Value(value))
        }

        ExprKind::ArrayRead { array, idx } => {
            let field = names::array_field(ctx.sys, *array);
            Ok(Lowered::Value(
                RExpr::Index {
                    recv: Box::new(RExpr::path(format!("sim.{field}.payload"))),
                    idx: Box::new(index_usize(rval(ctx, user, *idx))),
                }
                .method("clone", vec![]),
            ))
        }

        ExprKind::ArrayWrite { array, idx, value } => Ok(Lowered::Stmts(staged_array_write(
            ctx,
            user,
            *array,
            *idx,
            *value,
            Writer::Module(user),
        ))),

        ExprKind::FifoPop { port } => Ok(Lowered::Value(RExpr::PopOrSuspend {
            queue: Box::new(RExpr::path(format!(
                "sim.{}",
                names::fifo_field(ctx.sys, *port)
            ))),
            stamp: Box::new(commit_stamp_expr()),
        })),

        ExprKind::FifoPush { port, value } => {
            let elem = storage_type(ctx.sys.ports[*port].dtype);
            Ok(Lowered::Stmts(vec![RStmt::Expr(
                RExpr::path(format!("sim.{}", names::fifo_field(ctx.sys, *port))).method(
                    "push",
                    vec![
                        commit_stamp_expr(),
                        rval(ctx, user, *value).cast_to(elem),
                        RExpr::Str(ctx.sys.module_name(user).to_string()),
                    ],
                ),
            )]))
        }

        ExprKind::FifoPeek { port } => Ok(Lowered::Value(
            RExpr::path(format!("sim.{}", names::fifo_field(ctx.sys, *port)))
                .method("front", vec![])
                .method("cloned", vec![])
                .method(
                    "expect",
                    vec![RExpr::Str("peek on an empty queue".to_string())],
                ),
        )),

        ExprKind::FifoValid { port } => Ok(Lowered::Value(RExpr::Unary {
            op: "!",
            expr: Box::new(
                RExpr::path(format!("sim.{}", names::fifo_field(ctx.sys, *port)))
                    .method("is_empty", vec![]),
            ),
        })),

        ExprKind::ValueValid { value } => Ok(Lowered::Value(
            RExpr::path(format!("sim.{}", names::value_field(ctx.sys, *value)))
                .method("is_some", vec![]),
        )),

        ExprKind::ModuleTriggered { module } => Ok(Lowered::Value(RExpr::path(format!(
            "sim.{}",
            names::triggered_field(ctx.sys, *module)
        )))),

        // A bind only packages arguments; the paired async call emits them.
        ExprKind::Bind { .. } => Ok(Lowered::Empty),

        ExprKind::AsyncCall { bind } => {
            let ExprKind::Bind { callee, args } = &ctx.sys.exprs[*bind].kind else {
                return Err(SimGenError::Unsupported {
                    what: "async call".to_string(),
                    reason: "target is not a bind".to_string(),
                });
            };
            let mut stmts = Vec::new();
            for arg in args {
                let elem = storage_type(ctx.sys.ports[arg.port].dtype);
                stmts.push(RStmt::Expr(
                    RExpr::path(format!("sim.{}", names::fifo_field(ctx.sys, arg.port))).method(
                        "push",
                        vec![
                            commit_stamp_expr(),
                            rval(ctx, user, arg.value).cast_to(elem),
                            RExpr::Str(ctx.sys.module_name(user).to_string()),
                        ],
                    ),
                ));
            }
            stmts.push(RStmt::Expr(
                RExpr::path(format!("sim.{}", names::event_field(ctx.sys, *callee)))
                    .method("push_back", vec![next_cycle_stamp_expr()]),
            ));
            Ok(Lowered::Stmts(stmts))
        }

        ExprKind::WireAssign { wire, value } => {
            let w = &ctx.sys.wires[*wire];
            debug_assert_eq!(w.direction, WireDirection::Input);
            let owner = w.owner;
            let raw = ffi_storage_type(
                w.dtype.bits(),
                w.dtype.is_signed(),
                &format!("wire {}", ctx.sys.resolve(w.name)),
            )?;
            Ok(Lowered::Stmts(vec![
                RStmt::Expr(
                    RExpr::path(format!("sim.{}", names::handle_field(ctx.sys, owner))).method(
                        // set_<wire> is generated per port by the FFI bridge.
                        format!("set_{}", ctx.sys.resolve(w.name)),
                        vec![rval(ctx, user, *value).cast_to(RType::Prim(raw))],
                    ),
                ),
                RStmt::Assign {
                    target: RExpr::path(format!("sim.{}", names::dirty_field(ctx.sys, owner))),
                    value: RExpr::lit("true"),
                },
            ]))
        }

        ExprKind::WireRead { wire } => {
            let w = &ctx.sys.wires[*wire];
            debug_assert_eq!(w.direction, WireDirection::Output);
            let owner = w.owner;
            let handle = names::handle_field(ctx.sys, owner);
            let dirty = names::dirty_field(ctx.sys, owner);
            // Deferred-evaluation rule: flush pending input writes at the
            // first output read, exactly once.
            let flush = RStmt::If {
                cond: RExpr::path(format!("sim.{dirty}")),
                then_body: vec![
                    RStmt::Expr(RExpr::path(format!("sim.{handle}")).method("eval", vec![])),
                    RStmt::Assign {
                        target: RExpr::path(format!("sim.{dirty}")),
                        value: RExpr::lit("false"),
                    },
                ],
                else_body: None,
            };
            let getter =
                RExpr::path(format!("sim.{handle}")).method(format!("get_{}", ctx.sys.resolve(w.name)), vec![]);
            Ok(Lowered::Value(RExpr::Block {
                stmts: vec![flush],
                tail: Some(Box::new(
                    getter.cast_to(storage_type(expr.dtype.expect("wire reads are typed"))),
                )),
            }))
        }

        ExprKind::Log { format, args } => {
            let module_name = ctx.sys.module_name(user);
            let text = format!("@{{:05}} [{module_name}]\t{}", ctx.sys.resolve(*format));
            let mut macro_args = vec![RExpr::Str(text), RExpr::path("sim.stamp")];
            for &arg in args {
                // 1-bit values print as 0/1, not true/false.
                let value = if dtype_of(ctx, arg).bits() == 1 {
                    rval(ctx, user, arg).cast_to(RType::Prim("u8"))
                } else {
                    rval(ctx, user, arg)
                };
                macro_args.push(value);
            }
            Ok(Lowered::Stmts(vec![RStmt::Expr(RExpr::MacroCall {
                name: "println",
                args: macro_args,
            })]))
        }

        ExprKind::WaitUntil { cond } => Ok(Lowered::Stmts(vec![RStmt::If {
            cond: RExpr::Unary {
                op: "!",
                expr: Box::new(rval(ctx, user, *cond).cast_to(RType::Bool)),
            },
            then_body: vec![RStmt::Return(Some(RExpr::lit("false")))],
            else_body: None,
        }])),

        ExprKind::Assert { cond } => Ok(Lowered::Stmts(vec![RStmt::Expr(RExpr::MacroCall {
            name: "assert",
            args: vec![rval(ctx, user, *cond).cast_to(RType::Bool)],
        })])),

        ExprKind::Finish => Ok(Lowered::Stmts(vec![RStmt::Expr(RExpr::Call {
            callee: "std::process::exit".to_string(),
            args: vec![RExpr::lit("0")],
        })])),

        ExprKind::Barrier { .. } => Ok(Lowered::Stmts(vec![RStmt::Comment(
            "barrier: ordering hint only".to_string(),
        )])),

        ExprKind::MemWrite { array, idx, value } => Ok(Lowered::Stmts(staged_array_write(
            ctx,
            user,
            *array,
            *idx,
            *value,
            Writer::DramCallback,
        ))),

        ExprKind::SendReadRequest { addr, .. } => Ok(Lowered::Value(RExpr::Block {
            stmts: vec![
                RStmt::Let {
                    name: "addr".to_string(),
                    value: rval(ctx, user, *addr).cast_to(RType::Prim("i64")),
                },
                RStmt::Let {
                    name: "accepted".to_string(),
                    value: RExpr::path("sim.mem_model")
                        .method("send_request", vec![RExpr::path("addr"), RExpr::lit("false")]),
                },
                RStmt::If {
                    cond: RExpr::path("accepted"),
                    then_body: vec![RStmt::Expr(RExpr::path("sim.request_stamp_map").method(
                        "insert",
                        vec![RExpr::path("addr"), RExpr::path("sim.stamp")],
                    ))],
                    else_body: None,
                },
            ],
            tail: Some(Box::new(RExpr::path("accepted"))),
        })),

        ExprKind::SendWriteRequest { addr, we, .. } => Ok(Lowered::Value(RExpr::Ternary {
            cond: Box::new(rval(ctx, user, *we).cast_to(RType::Bool)),
            then_value: Box::new(RExpr::path("sim.mem_model").method(
                "send_request",
                vec![
                    rval(ctx, user, *addr).cast_to(RType::Prim("i64")),
                    RExpr::lit("true"),
                ],
            )),
            else_value: Box::new(RExpr::lit("false")),
        })),

        // Metadata only; consumed by the callback collector.
        ExprKind::UseDram { .. } => Ok(Lowered::Empty),

        ExprKind::HasMemResp { .. } => Ok(Lowered::Value(match ctx.callbacks.resp_fifo {
            Some(port) => RExpr::Unary {
                op: "!",
                expr: Box::new(
                    RExpr::path(format!("sim.{}", names::fifo_field(ctx.sys, port)))
                        .method("is_empty", vec![]),
                ),
            },
            None => RExpr::lit("false"),
        })),

        ExprKind::MemResp { .. } => {
            let ty = storage_type(expr.dtype.expect("memory responses are typed"));
            Ok(Lowered::Value(match ctx.callbacks.resp_fifo {
                Some(port) => RExpr::path(format!("sim.{}", names::fifo_field(ctx.sys, port)))
                    .method("front", vec![])
                    .method("cloned", vec![])
                    .method(
                        "expect",
                        vec![RExpr::Str("no memory response pending".to_string())],
                    )
                    .cast_to(ty),
                None => int_literal(expr.dtype.expect("typed"), 0),
            }))
        }
    }
}
