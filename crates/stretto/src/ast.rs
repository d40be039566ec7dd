//! Surface constructors for the evaluator-node tree.
//!
//! The builder produces plain [`Node`] trees; all validation (scoping,
//! arities, call-target shapes) happens when the tree is handed to
//! [`Library::define`](crate::Library::define).
//!
//! ```
//! use stretto::{Library, Value, ast};
//!
//! let mut lib = Library::new();
//! let answer = lib.define("answer", ast::lambda(&[], ast::int(42))).unwrap();
//! assert_eq!(answer.call0().unwrap(), Value::Int(42));
//! ```

use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    node::{Expr, LambdaExpr, Node},
    primitive::Primitive,
    value::Value,
    variable::{VarKind, Variable},
};

/// A variable handle, shared between its declaration site and its uses.
#[derive(Debug, Clone)]
pub struct Var(pub(crate) Arc<Variable>);

/// Creates a fresh parameter variable.
#[must_use]
pub fn var(name: &str) -> Var {
    Var(Variable::new(name, VarKind::Param))
}

/// Creates a fresh `let`-bound variable.
#[must_use]
pub fn local(name: &str) -> Var {
    Var(Variable::new(name, VarKind::Let))
}

/// An integer constant.
#[must_use]
pub fn int(value: i64) -> Node {
    Node::new(Expr::Const(Value::Int(value)))
}

/// A boolean constant.
#[must_use]
pub fn bool_(value: bool) -> Node {
    Node::new(Expr::Const(Value::Bool(value)))
}

/// A string constant.
#[must_use]
pub fn str_(value: &str) -> Node {
    Node::new(Expr::Const(Value::str(value)))
}

/// Reads a variable.
#[must_use]
pub fn get(v: &Var) -> Node {
    Node::new(Expr::GetVar(Arc::clone(&v.0)))
}

/// Assigns a variable; evaluates to the assigned value.
#[must_use]
pub fn set(v: &Var, value: Node) -> Node {
    Node::new(Expr::SetVar {
        var: Arc::clone(&v.0),
        value: Box::new(value),
    })
}

/// Binds `v` to `init` for the duration of `body`; evaluates to the body.
#[must_use]
pub fn let_(v: &Var, init: Node, body: Node) -> Node {
    Node::new(Expr::Let {
        var: Arc::clone(&v.0),
        init: Box::new(init),
        body: Box::new(body),
    })
}

/// Two-armed conditional. The condition must evaluate to a boolean.
#[must_use]
pub fn if_(cond: Node, then: Node, alt: Node) -> Node {
    Node::new(Expr::If {
        cond: Box::new(cond),
        then: Box::new(then),
        alt: Box::new(alt),
        true_count: crate::profile::BranchCounter::default(),
        false_count: crate::profile::BranchCounter::default(),
    })
}

/// Loops `body` while `cond` evaluates to true; evaluates to the last body
/// value, or void when the body never ran.
#[must_use]
pub fn while_(cond: Node, body: Node) -> Node {
    Node::new(Expr::While {
        cond: Box::new(cond),
        body: Box::new(body),
    })
}

/// A sequence; evaluates to its last expression.
#[must_use]
pub fn block(exprs: Vec<Node>) -> Node {
    Node::new(Expr::Block(exprs))
}

/// Returns from the enclosing function.
#[must_use]
pub fn ret(value: Node) -> Node {
    Node::new(Expr::Return(Box::new(value)))
}

/// Calls a callee with up to two arguments. The callee must be a lambda or
/// a function reference obtained from [`Library::self_ref`](crate::Library::self_ref).
#[must_use]
pub fn call(callee: Node, args: Vec<Node>) -> Node {
    Node::new(Expr::Call {
        callee: Box::new(callee),
        args: args.into_iter().map(Box::new).collect::<SmallVec<[Box<Node>; 2]>>(),
        profile: crate::profile::ValueProfile::new(),
    })
}

/// Applies a unary primitive.
#[must_use]
pub fn prim1(op: Primitive, arg: Node) -> Node {
    Node::new(Expr::Prim1 {
        op,
        arg: Box::new(arg),
    })
}

/// Applies a binary primitive.
#[must_use]
pub fn prim2(op: Primitive, lhs: Node, rhs: Node) -> Node {
    Node::new(Expr::Prim2 {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

/// A lambda expression.
#[must_use]
pub fn lambda(params: &[Var], body: Node) -> Node {
    Node::new(Expr::Lambda(Box::new(LambdaExpr {
        params: params.iter().map(|v| Arc::clone(&v.0)).collect(),
        body,
    })))
}
