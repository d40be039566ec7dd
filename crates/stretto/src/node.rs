//! The evaluator-node tree.
//!
//! Function bodies are trees of [`Node`]s: a closed expression variant plus
//! two mutable type annotations (the statically inferred type and the
//! profile-observed type). The tree is built by the surface constructors in
//! [`ast`](crate::ast), restructured once by the analyzer, and never changes
//! shape afterwards — only annotations, profiles, and branch counters are
//! written during execution and compilation, and those are all atomic.

use std::{fmt, sync::Arc};

use smallvec::SmallVec;

use crate::{
    function::FunctionId,
    kind::TypeCell,
    primitive::Primitive,
    profile::{BranchCounter, ValueProfile},
    value::Value,
    variable::Variable,
};

/// One node of a function body, with its type annotations.
#[derive(Debug)]
pub struct Node {
    pub(crate) expr: Expr,
    /// Type derived by static analysis of the IR alone.
    pub(crate) inferred: TypeCell,
    /// Type derived from recorded runtime profiles.
    pub(crate) observed: TypeCell,
}

impl Node {
    pub(crate) fn new(expr: Expr) -> Self {
        Self {
            expr,
            inferred: TypeCell::new(),
            observed: TypeCell::new(),
        }
    }
}

/// A lambda as delivered by the expression builder, before the translator
/// extracts it into its own function.
#[derive(Debug)]
pub(crate) struct LambdaExpr {
    pub params: Vec<Arc<Variable>>,
    pub body: Node,
}

/// A closure-creation site after translation.
#[derive(Debug)]
pub(crate) struct ClosureExpr {
    /// Registry id of the nested function.
    pub func: FunctionId,
    /// Position of the nested function within the compilation unit.
    pub unit_index: usize,
    /// Frame slots of the supplier variables in the enclosing function, in
    /// the nested function's synthetic-parameter order. Filled by the
    /// indexer; this is the capture template read at closure creation.
    pub captures: Vec<u32>,
}

#[derive(Debug)]
pub(crate) enum Expr {
    Const(Value),
    GetVar(Arc<Variable>),
    SetVar {
        var: Arc<Variable>,
        value: Box<Node>,
    },
    Let {
        var: Arc<Variable>,
        init: Box<Node>,
        body: Box<Node>,
    },
    If {
        cond: Box<Node>,
        then: Box<Node>,
        alt: Box<Node>,
        true_count: BranchCounter,
        false_count: BranchCounter,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    Block(Vec<Node>),
    Return(Box<Node>),
    Call {
        callee: Box<Node>,
        args: SmallVec<[Box<Node>; 2]>,
        /// Kinds of values this call site produced during profiling.
        profile: ValueProfile,
    },
    Prim1 {
        op: Primitive,
        arg: Box<Node>,
    },
    Prim2 {
        op: Primitive,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// A lambda not yet extracted by the translator. Never survives
    /// translation.
    Lambda(Box<LambdaExpr>),
    /// A closure-creation site.
    Closure(ClosureExpr),
    /// A reference to a top-level function by registry id.
    FreeFunctionRef(FunctionId),
}

/// Calls `f` on `node` and every descendant within the same function, in
/// preorder. Does not descend into nested functions: after translation a
/// closure site carries only the nested function's id.
pub(crate) fn walk(node: &Node, f: &mut impl FnMut(&Node)) {
    f(node);
    match &node.expr {
        Expr::Const(_) | Expr::GetVar(_) | Expr::FreeFunctionRef(_) | Expr::Closure(_) => {}
        Expr::SetVar { value, .. } | Expr::Return(value) => walk(value, f),
        Expr::Let { init, body, .. } => {
            walk(init, f);
            walk(body, f);
        }
        Expr::If { cond, then, alt, .. } => {
            walk(cond, f);
            walk(then, f);
            walk(alt, f);
        }
        Expr::While { cond, body } => {
            walk(cond, f);
            walk(body, f);
        }
        Expr::Block(exprs) => {
            for e in exprs {
                walk(e, f);
            }
        }
        Expr::Call { callee, args, .. } => {
            walk(callee, f);
            for a in args {
                walk(a, f);
            }
        }
        Expr::Prim1 { arg, .. } => walk(arg, f),
        Expr::Prim2 { lhs, rhs, .. } => {
            walk(lhs, f);
            walk(rhs, f);
        }
        Expr::Lambda(lambda) => walk(&lambda.body, f),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::GetVar(var) => write!(f, "{}", var.name),
            Expr::SetVar { var, value } => write!(f, "(set {} {value})", var.name),
            Expr::Let { var, init, body } => write!(f, "(let ({} {init}) {body})", var.name),
            Expr::If { cond, then, alt, .. } => write!(f, "(if {cond} {then} {alt})"),
            Expr::While { cond, body } => write!(f, "(while {cond} {body})"),
            Expr::Block(exprs) => {
                f.write_str("(begin")?;
                for e in exprs {
                    write!(f, " {e}")?;
                }
                f.write_str(")")
            }
            Expr::Return(value) => write!(f, "(return {value})"),
            Expr::Call { callee, args, .. } => {
                write!(f, "({callee}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                f.write_str(")")
            }
            Expr::Prim1 { op, arg } => write!(f, "({op} {arg})"),
            Expr::Prim2 { op, lhs, rhs } => write!(f, "({op} {lhs} {rhs})"),
            Expr::Lambda(lambda) => {
                f.write_str("(lambda (")?;
                for (i, p) in lambda.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str(&p.name)?;
                }
                write!(f, ") {})", lambda.body)
            }
            Expr::Closure(c) => write!(f, "<closure {}>", c.func),
            Expr::FreeFunctionRef(id) => write!(f, "<function {id}>"),
        }
    }
}
