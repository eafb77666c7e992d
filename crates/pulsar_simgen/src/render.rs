//! Structured render tree for generated Rust.
//!
//! Lowering produces [`RExpr`]/[`RStmt`] nodes instead of strings; a single
//! textual backend turns the tree into source. Semantic decisions (width
//! casts, staging calls, suspension points) stay in typed data, and the
//! backend only decides spelling and indentation.

use std::fmt::Write as _;

/// A target storage type in generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RType {
    /// `bool`.
    Bool,
    /// A primitive integer, e.g. `u32`.
    Prim(&'static str),
    /// `BigUint`.
    BigUint,
    /// `BigInt`.
    BigInt,
}

impl RType {
    /// The Rust spelling of this type.
    pub fn name(&self) -> &'static str {
        match self {
            RType::Bool => "bool",
            RType::Prim(name) => name,
            RType::BigUint => "BigUint",
            RType::BigInt => "BigInt",
        }
    }

    /// `true` for the arbitrary-precision types.
    pub fn is_big(&self) -> bool {
        matches!(self, RType::BigUint | RType::BigInt)
    }
}

/// An expression node in the render tree.
#[derive(Debug, Clone)]
pub enum RExpr {
    /// A literal token, e.g. `42u32` or `true`.
    Lit(String),
    /// A string literal, quoted and escaped on emission.
    Str(String),
    /// A plain path, e.g. `value` or `sim.stamp`.
    Path(String),
    /// A unary operator application.
    Unary {
        /// The operator token.
        op: &'static str,
        /// The operand.
        expr: Box<RExpr>,
    },
    /// A parenthesized binary operator application.
    Binary {
        /// The operator token.
        op: &'static str,
        /// Left operand.
        lhs: Box<RExpr>,
        /// Right operand.
        rhs: Box<RExpr>,
    },
    /// A `ValueCastTo::<T>::cast(&x)` width-exact cast.
    Cast {
        /// The target storage type.
        to: RType,
        /// The cast value.
        value: Box<RExpr>,
    },
    /// `(<x> as usize)`, for indexing only.
    AsUsize(Box<RExpr>),
    /// A free-function or associated-function call.
    Call {
        /// The callee path.
        callee: String,
        /// Arguments.
        args: Vec<RExpr>,
    },
    /// A method call.
    Method {
        /// The receiver.
        recv: Box<RExpr>,
        /// The method name.
        method: String,
        /// Arguments.
        args: Vec<RExpr>,
    },
    /// A macro invocation, e.g. `println!`/`assert!`.
    MacroCall {
        /// The macro name, without `!`.
        name: &'static str,
        /// Arguments.
        args: Vec<RExpr>,
    },
    /// An index expression `recv[idx]`.
    Index {
        /// The indexed value.
        recv: Box<RExpr>,
        /// The index.
        idx: Box<RExpr>,
    },
    /// A borrow `&x`.
    Ref(Box<RExpr>),
    /// `if cond { then } else { otherwise }` used as a value.
    Ternary {
        /// The condition.
        cond: Box<RExpr>,
        /// Value when true.
        then_value: Box<RExpr>,
        /// Value when false.
        else_value: Box<RExpr>,
    },
    /// A block expression with statements and an optional tail value.
    Block {
        /// The statements.
        stmts: Vec<RStmt>,
        /// The tail value.
        tail: Option<Box<RExpr>>,
    },
    /// A staged FIFO pop that suspends the enclosing step function when the
    /// queue is empty: `match q.pop(s) { Some(v) => v, None => return false }`.
    PopOrSuspend {
        /// The queue, e.g. `sim.Adder_a`.
        queue: Box<RExpr>,
        /// The commit stamp.
        stamp: Box<RExpr>,
    },
}

impl RExpr {
    /// A plain path expression.
    pub fn path(p: impl Into<String>) -> Self {
        RExpr::Path(p.into())
    }

    /// A literal token.
    pub fn lit(l: impl Into<String>) -> Self {
        RExpr::Lit(l.into())
    }

    /// A width-exact cast of `self` to the given storage type.
    pub fn cast_to(self, to: RType) -> Self {
        RExpr::Cast {
            to,
            value: Box::new(self),
        }
    }

    /// A method call on `self`.
    pub fn method(self, method: impl Into<String>, args: Vec<RExpr>) -> Self {
        RExpr::Method {
            recv: Box::new(self),
            method: method.into(),
            args,
        }
    }

    /// A binary application with `self` on the left.
    pub fn bin(self, op: &'static str, rhs: RExpr) -> Self {
        RExpr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }
}

/// A statement node in the render tree.
#[derive(Debug, Clone)]
pub enum RStmt {
    /// `let <name> = <value>;`
    Let {
        /// The bound name.
        name: String,
        /// The bound value.
        value: RExpr,
    },
    /// `<target> = <value>;`
    Assign {
        /// The assignment target.
        target: RExpr,
        /// The assigned value.
        value: RExpr,
    },
    /// `<expr>;`
    Expr(RExpr),
    /// `if <cond> { ... } else { ... }`
    If {
        /// The condition.
        cond: RExpr,
        /// The then-branch.
        then_body: Vec<RStmt>,
        /// The optional else-branch.
        else_body: Option<Vec<RStmt>>,
    },
    /// `return <value>;`
    Return(Option<RExpr>),
    /// `// <text>`
    Comment(String),
}

/// Emits render-tree nodes as indented source text.
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    indent: usize,
}

impl CodeWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one raw line at the current indentation.
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Appends an empty line.
    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Runs `body` with one extra indentation level.
    pub fn indented(&mut self, body: impl FnOnce(&mut Self)) {
        self.indent += 1;
        body(self);
        self.indent -= 1;
    }

    /// Runs a fallible `body` with one extra indentation level.
    pub fn try_indented<E>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<(), E> {
        self.indent += 1;
        let result = body(self);
        self.indent -= 1;
        result
    }

    /// Emits a statement.
    pub fn stmt(&mut self, stmt: &RStmt) {
        match stmt {
            RStmt::Let { name, value } => {
                self.line(&format!("let {name} = {};", render_expr(value)));
            }
            RStmt::Assign { target, value } => {
                self.line(&format!("{} = {};", render_expr(target), render_expr(value)));
            }
            RStmt::Expr(expr) => {
                self.line(&format!("{};", render_expr(expr)));
            }
            RStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.line(&format!("if {} {{", render_expr(cond)));
                self.indented(|w| {
                    for s in then_body {
                        w.stmt(s);
                    }
                });
                match else_body {
                    Some(body) => {
                        self.line("} else {");
                        self.indented(|w| {
                            for s in body {
                                w.stmt(s);
                            }
                        });
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            RStmt::Return(value) => match value {
                Some(v) => self.line(&format!("return {};", render_expr(v))),
                None => self.line("return;"),
            },
            RStmt::Comment(text) => self.line(&format!("// {text}")),
        }
    }

    /// Emits a statement list.
    pub fn stmts(&mut self, stmts: &[RStmt]) {
        for s in stmts {
            self.stmt(s);
        }
    }

    /// Consumes the writer and returns the emitted text.
    pub fn finish(self) -> String {
        self.out
    }
}

/// Renders one expression to a single-line string.
pub fn render_expr(expr: &RExpr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_args(out: &mut String, args: &[RExpr]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg);
    }
}

fn write_expr(out: &mut String, expr: &RExpr) {
    match expr {
        RExpr::Lit(token) | RExpr::Path(token) => out.push_str(token),
        RExpr::Str(text) => {
            let _ = write!(out, "{:?}", text);
        }
        RExpr::Unary { op, expr } => {
            out.push_str(op);
            write_expr(out, expr);
        }
        RExpr::Binary { op, lhs, rhs } => {
            out.push('(');
            write_expr(out, lhs);
            let _ = write!(out, " {op} ");
            write_expr(out, rhs);
            out.push(')');
        }
        RExpr::Cast { to, value } => {
            let _ = write!(out, "ValueCastTo::<{}>::cast(&", to.name());
            write_expr(out, value);
            out.push(')');
        }
        RExpr::AsUsize(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push_str(" as usize)");
        }
        RExpr::Call { callee, args } => {
            out.push_str(callee);
            out.push('(');
            write_args(out, args);
            out.push(')');
        }
        RExpr::Method { recv, method, args } => {
            write_expr(out, recv);
            let _ = write!(out, ".{method}(");
            write_args(out, args);
            out.push(')');
        }
        RExpr::MacroCall { name, args } => {
            let _ = write!(out, "{name}!(");
            write_args(out, args);
            out.push(')');
        }
        RExpr::Index { recv, idx } => {
            write_expr(out, recv);
            out.push('[');
            write_expr(out, idx);
            out.push(']');
        }
        RExpr::Ref(inner) => {
            out.push('&');
            write_expr(out, inner);
        }
        RExpr::Ternary {
            cond,
            then_value,
            else_value,
        } => {
            out.push_str("if ");
            write_expr(out, cond);
            out.push_str(" { ");
            write_expr(out, then_value);
            out.push_str(" } else { ");
            write_expr(out, else_value);
            out.push_str(" }");
        }
        RExpr::Block { stmts, tail } => {
            out.push_str("{ ");
            let mut writer = CodeWriter::new();
            for s in stmts {
                writer.stmt(s);
            }
            // Inline the block body on one logical line.
            for line in writer.finish().lines() {
                out.push_str(line.trim_start());
                out.push(' ');
            }
            if let Some(tail) = tail {
                write_expr(out, tail);
                out.push(' ');
            }
            out.push('}');
        }
        RExpr::PopOrSuspend { queue, stamp } => {
            out.push_str("match ");
            write_expr(out, queue);
            out.push_str(".pop(");
            write_expr(out, stamp);
            out.push_str(") { Some(value) => value, None => return false }");
        }
    }
}
