//! Static analysis of freshly translated definitions.
//!
//! Three passes run in order over a compilation unit:
//!
//! 1. **Scope validation** — every variable reference must be in scope, no
//!    binding may shadow another, calls must target a closure or a function
//!    reference with at most two arguments. Variable ownership is recorded
//!    here.
//! 2. **Closure conversion** — free references are rewritten to *copied*
//!    variables, one per function per original, in insertion order; each
//!    copied variable is wired to the supplier slot in the enclosing
//!    function it is captured from.
//! 3. **Indexing** — frame slots are assigned: copied parameters first,
//!    declared parameters next, then `let` locals through a stack allocator
//!    that releases on scope exit. The high-water mark becomes the frame
//!    size, and every closure site gets its capture template.
//!
//! The passes are idempotent; the re-run at compile time
//! ([`revalidate`]) is a read-only walk that re-checks the same invariants
//! against the recorded owners and indices.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    error::CompileError,
    function::{FunctionId, FunctionImpl, registry},
    node::{Expr, Node, walk},
    value::Value,
    variable::Variable,
};

/// A function under analysis, before it is frozen into a
/// [`FunctionImpl`].
#[derive(Debug)]
pub(crate) struct ProtoFunction {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Arc<Variable>>,
    /// Copied variables, keyed by the identity of their original.
    pub synthetic: IndexMap<usize, Arc<Variable>>,
    pub body: Node,
    pub frame_size: usize,
}

fn placeholder() -> Node {
    Node::new(Expr::Const(Value::Void))
}

/// Extracts every lambda of `lambda` (itself included) into a
/// [`ProtoFunction`], in preorder, so the unit root sits at index 0.
///
/// Nested lambdas are replaced by closure-creation nodes carrying the
/// nested function's reserved registry id.
pub(crate) fn translate(
    name: &str,
    root_id: FunctionId,
    params: Vec<Arc<Variable>>,
    body: Node,
) -> Vec<ProtoFunction> {
    let mut protos = Vec::new();
    let index = make_proto(&mut protos, name.to_owned(), Some(root_id), params, body);
    debug_assert_eq!(index, 0);
    protos
}

fn make_proto(
    protos: &mut Vec<ProtoFunction>,
    name: String,
    reserved: Option<FunctionId>,
    params: Vec<Arc<Variable>>,
    mut body: Node,
) -> usize {
    let index = protos.len();
    let id = reserved.unwrap_or_else(registry::reserve);
    protos.push(ProtoFunction {
        id,
        name,
        params,
        synthetic: IndexMap::new(),
        body: placeholder(),
        frame_size: 0,
    });
    extract_lambdas(protos, &mut body, index);
    protos[index].body = body;
    index
}

fn extract_lambdas(protos: &mut Vec<ProtoFunction>, node: &mut Node, parent: usize) {
    if let Expr::Lambda(_) = node.expr {
        let Expr::Lambda(lambda) = std::mem::replace(&mut node.expr, Expr::Const(Value::Void)) else {
            unreachable!()
        };
        let name = format!("{}.<lambda {}>", protos[parent].name, protos.len());
        let unit_index = make_proto(protos, name, None, lambda.params, lambda.body);
        node.expr = Expr::Closure(crate::node::ClosureExpr {
            func: protos[unit_index].id,
            unit_index,
            captures: Vec::new(),
        });
        return;
    }
    match &mut node.expr {
        Expr::Const(_) | Expr::GetVar(_) | Expr::FreeFunctionRef(_) | Expr::Closure(_) => {}
        Expr::SetVar { value, .. } | Expr::Return(value) => extract_lambdas(protos, value, parent),
        Expr::Let { init, body, .. } => {
            extract_lambdas(protos, init, parent);
            extract_lambdas(protos, body, parent);
        }
        Expr::If { cond, then, alt, .. } => {
            extract_lambdas(protos, cond, parent);
            extract_lambdas(protos, then, parent);
            extract_lambdas(protos, alt, parent);
        }
        Expr::While { cond, body } => {
            extract_lambdas(protos, cond, parent);
            extract_lambdas(protos, body, parent);
        }
        Expr::Block(exprs) => {
            for e in exprs {
                extract_lambdas(protos, e, parent);
            }
        }
        Expr::Call { callee, args, .. } => {
            extract_lambdas(protos, callee, parent);
            for a in args {
                extract_lambdas(protos, a, parent);
            }
        }
        Expr::Prim1 { arg, .. } => extract_lambdas(protos, arg, parent),
        Expr::Prim2 { lhs, rhs, .. } => {
            extract_lambdas(protos, lhs, parent);
            extract_lambdas(protos, rhs, parent);
        }
        Expr::Lambda(_) => unreachable!("handled above"),
    }
}

/// Runs all three analysis passes over a translated unit.
pub(crate) fn analyze(protos: &mut [ProtoFunction]) -> Result<(), CompileError> {
    validate_scopes(protos)?;
    convert_closures(protos);
    assign_indices(protos);
    Ok(())
}

// ---------------------------------------------------------------------------
// Pass 1: scope validation.

struct ScopeCheck<'p> {
    protos: &'p [ProtoFunction],
    /// Bound names, for shadowing checks.
    names: AHashMap<String, usize>,
    /// Identities of in-scope variables.
    in_scope: AHashSet<usize>,
}

fn validate_scopes(protos: &[ProtoFunction]) -> Result<(), CompileError> {
    let mut check = ScopeCheck {
        protos,
        names: AHashMap::new(),
        in_scope: AHashSet::new(),
    };
    check.function(0)
}

impl ScopeCheck<'_> {
    fn bind(&mut self, var: &Arc<Variable>) -> Result<(), CompileError> {
        if self.names.contains_key(&var.name) {
            return Err(CompileError::ShadowedVariable(var.name.clone()));
        }
        self.names.insert(var.name.clone(), var.id());
        self.in_scope.insert(var.id());
        Ok(())
    }

    fn unbind(&mut self, var: &Arc<Variable>) {
        self.names.remove(&var.name);
        self.in_scope.remove(&var.id());
    }

    fn function(&mut self, index: usize) -> Result<(), CompileError> {
        // Detach the proto reference from `self` so bindings can be updated
        // while it is held.
        let protos = self.protos;
        let proto = &protos[index];
        for param in &proto.params {
            self.bind(param)?;
            param.set_owner(proto.id);
        }
        let result = self.node(proto.id, &proto.body);
        for param in &proto.params {
            self.unbind(param);
        }
        result
    }

    fn node(&mut self, owner: FunctionId, node: &Node) -> Result<(), CompileError> {
        match &node.expr {
            Expr::Const(_) | Expr::FreeFunctionRef(_) => Ok(()),
            Expr::GetVar(var) => self.reference(var),
            Expr::SetVar { var, value } => {
                self.reference(var)?;
                self.node(owner, value)
            }
            Expr::Let { var, init, body } => {
                self.node(owner, init)?;
                self.bind(var)?;
                var.set_owner(owner);
                let result = self.node(owner, body);
                self.unbind(var);
                result
            }
            Expr::If { cond, then, alt, .. } => {
                self.node(owner, cond)?;
                self.node(owner, then)?;
                self.node(owner, alt)
            }
            Expr::While { cond, body } => {
                self.node(owner, cond)?;
                self.node(owner, body)
            }
            Expr::Block(exprs) => {
                for e in exprs {
                    self.node(owner, e)?;
                }
                Ok(())
            }
            Expr::Return(value) => self.node(owner, value),
            Expr::Call { callee, args, .. } => {
                if !matches!(callee.expr, Expr::Closure(_) | Expr::FreeFunctionRef(_)) {
                    return Err(CompileError::UnexpectedCallTarget);
                }
                if args.len() > 2 {
                    return Err(CompileError::TooManyArguments);
                }
                self.node(owner, callee)?;
                for a in args {
                    self.node(owner, a)?;
                }
                Ok(())
            }
            Expr::Prim1 { op, arg } => {
                if op.arity() != 1 {
                    return Err(CompileError::PrimitiveArity(*op, op.arity()));
                }
                self.node(owner, arg)
            }
            Expr::Prim2 { op, lhs, rhs } => {
                if op.arity() != 2 {
                    return Err(CompileError::PrimitiveArity(*op, op.arity()));
                }
                self.node(owner, lhs)?;
                self.node(owner, rhs)
            }
            Expr::Closure(c) => self.function(c.unit_index),
            Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
        }
    }

    fn reference(&self, var: &Arc<Variable>) -> Result<(), CompileError> {
        if self.in_scope.contains(&var.id()) {
            Ok(())
        } else {
            Err(CompileError::UnboundVariable(var.name.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// Pass 2: closure conversion.

fn convert_closures(protos: &mut [ProtoFunction]) {
    convert_function(protos, 0);
}

fn convert_function(protos: &mut [ProtoFunction], index: usize) {
    // Children first: their copied-variable lists feed this function's
    // free-variable set.
    let children = closure_indices(&protos[index].body);
    for child in &children {
        convert_function(protos, *child);
    }

    let owner = protos[index].id;
    let body = std::mem::replace(&mut protos[index].body, placeholder());

    // Gather the originals this function must copy, in first-encounter
    // order: direct free references, plus originals that nested closures
    // still need supplied.
    let mut needed: IndexMap<usize, Arc<Variable>> = IndexMap::new();
    collect_free(protos, owner, &body, &mut needed);
    for (identity, original) in needed {
        protos[index]
            .synthetic
            .entry(identity)
            .or_insert_with(|| Variable::copied(&original, owner));
    }

    let mut body = body;
    rewrite_and_supply(protos, index, owner, &mut body);
    protos[index].body = body;
}

fn closure_indices(node: &Node) -> Vec<usize> {
    let mut found = Vec::new();
    walk(node, &mut |n| {
        if let Expr::Closure(c) = &n.expr {
            found.push(c.unit_index);
        }
    });
    found
}

fn collect_free(
    protos: &[ProtoFunction],
    owner: FunctionId,
    body: &Node,
    needed: &mut IndexMap<usize, Arc<Variable>>,
) {
    walk(body, &mut |node| match &node.expr {
        Expr::GetVar(var) | Expr::SetVar { var, .. } => {
            if var.owner() != Some(owner) {
                needed.entry(var.id()).or_insert_with(|| Arc::clone(var));
            }
        }
        Expr::Closure(c) => {
            for copied in protos[c.unit_index].synthetic.values() {
                let original = copied.original().expect("synthetic variables are copies");
                if original.owner() != Some(owner) {
                    needed.entry(original.id()).or_insert_with(|| Arc::clone(original));
                }
            }
        }
        _ => {}
    });
}

fn rewrite_and_supply(protos: &[ProtoFunction], index: usize, owner: FunctionId, node: &mut Node) {
    match &mut node.expr {
        Expr::GetVar(var) => {
            if var.owner() != Some(owner) {
                *var = Arc::clone(&protos[index].synthetic[&var.id()]);
            }
        }
        Expr::SetVar { var, value } => {
            if var.owner() != Some(owner) {
                *var = Arc::clone(&protos[index].synthetic[&var.id()]);
            }
            rewrite_and_supply(protos, index, owner, value);
        }
        Expr::Closure(c) => {
            // The enclosing function supplies every copied variable of the
            // nested one: the original itself when it lives here, this
            // function's own copy otherwise.
            for copied in protos[c.unit_index].synthetic.values() {
                let original = copied.original().expect("synthetic variables are copies");
                let supplier = if original.owner() == Some(owner) {
                    Arc::clone(original)
                } else {
                    Arc::clone(&protos[index].synthetic[&original.id()])
                };
                copied.set_supplier(supplier);
            }
        }
        Expr::Const(_) | Expr::FreeFunctionRef(_) => {}
        Expr::Return(value) => rewrite_and_supply(protos, index, owner, value),
        Expr::Let { init, body, .. } => {
            rewrite_and_supply(protos, index, owner, init);
            rewrite_and_supply(protos, index, owner, body);
        }
        Expr::If { cond, then, alt, .. } => {
            rewrite_and_supply(protos, index, owner, cond);
            rewrite_and_supply(protos, index, owner, then);
            rewrite_and_supply(protos, index, owner, alt);
        }
        Expr::While { cond, body } => {
            rewrite_and_supply(protos, index, owner, cond);
            rewrite_and_supply(protos, index, owner, body);
        }
        Expr::Block(exprs) => {
            for e in exprs {
                rewrite_and_supply(protos, index, owner, e);
            }
        }
        Expr::Call { callee, args, .. } => {
            rewrite_and_supply(protos, index, owner, callee);
            for a in args {
                rewrite_and_supply(protos, index, owner, a);
            }
        }
        Expr::Prim1 { arg, .. } => rewrite_and_supply(protos, index, owner, arg),
        Expr::Prim2 { lhs, rhs, .. } => {
            rewrite_and_supply(protos, index, owner, lhs);
            rewrite_and_supply(protos, index, owner, rhs);
        }
        Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
    }
}

// ---------------------------------------------------------------------------
// Pass 3: indexing.

fn assign_indices(protos: &mut [ProtoFunction]) {
    for index in 0..protos.len() {
        let mut next = 0usize;
        for var in protos[index].synthetic.values() {
            var.set_index(next);
            next += 1;
        }
        for param in &protos[index].params {
            param.set_index(next);
            next += 1;
        }
        let mut body = std::mem::replace(&mut protos[index].body, placeholder());
        let mut high = next;
        index_node(protos, &mut body, &mut next, &mut high);
        protos[index].body = body;
        protos[index].frame_size = high;
    }
}

fn index_node(protos: &[ProtoFunction], node: &mut Node, next: &mut usize, high: &mut usize) {
    match &mut node.expr {
        Expr::Const(_) | Expr::GetVar(_) | Expr::FreeFunctionRef(_) => {}
        Expr::SetVar { value, .. } | Expr::Return(value) => index_node(protos, value, next, high),
        Expr::Let { var, init, body } => {
            index_node(protos, init, next, high);
            var.set_index(*next);
            *next += 1;
            *high = (*high).max(*next);
            index_node(protos, body, next, high);
            *next -= 1;
        }
        Expr::If { cond, then, alt, .. } => {
            index_node(protos, cond, next, high);
            index_node(protos, then, next, high);
            index_node(protos, alt, next, high);
        }
        Expr::While { cond, body } => {
            index_node(protos, cond, next, high);
            index_node(protos, body, next, high);
        }
        Expr::Block(exprs) => {
            for e in exprs {
                index_node(protos, e, next, high);
            }
        }
        Expr::Call { callee, args, .. } => {
            index_node(protos, callee, next, high);
            for a in args {
                index_node(protos, a, next, high);
            }
        }
        Expr::Prim1 { arg, .. } => index_node(protos, arg, next, high),
        Expr::Prim2 { lhs, rhs, .. } => {
            index_node(protos, lhs, next, high);
            index_node(protos, rhs, next, high);
        }
        Expr::Closure(c) => {
            // Record the capture template: the supplier slot for each of the
            // nested function's copied variables, in their declared order.
            c.captures = protos[c.unit_index]
                .synthetic
                .values()
                .map(|copied| {
                    let supplier = copied.supplier().expect("supplier resolved by closure conversion");
                    u32::try_from(supplier.index()).expect("frame index range")
                })
                .collect();
        }
        Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
    }
}

// ---------------------------------------------------------------------------
// Compile-time re-run.

/// Re-checks the analysis invariants over a frozen unit.
///
/// The mutating work of the three passes happened at definition time and is
/// idempotent, so the compile-time re-run reduces to verifying that every
/// reference resolves to a variable this function owns, every slot fits the
/// frame, and every call site is well-formed.
pub(crate) fn revalidate(unit: &[Arc<FunctionImpl>]) -> Result<(), CompileError> {
    for func in unit {
        let mut result = Ok(());
        walk(&func.body, &mut |node| {
            if result.is_err() {
                return;
            }
            result = match &node.expr {
                Expr::GetVar(var) | Expr::SetVar { var, .. } | Expr::Let { var, .. } => {
                    if var.owner() != Some(func.id) {
                        Err(CompileError::UnboundVariable(var.name.clone()))
                    } else if var.index() >= func.frame_size {
                        Err(CompileError::UnboundVariable(var.name.clone()))
                    } else {
                        Ok(())
                    }
                }
                Expr::Call { callee, args, .. } => {
                    if !matches!(callee.expr, Expr::Closure(_) | Expr::FreeFunctionRef(_)) {
                        Err(CompileError::UnexpectedCallTarget)
                    } else if args.len() > 2 {
                        Err(CompileError::TooManyArguments)
                    } else {
                        Ok(())
                    }
                }
                _ => Ok(()),
            };
        });
        result?;
    }
    Ok(())
}
