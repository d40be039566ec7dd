//! Bottom-up static type inference.
//!
//! Assigns every node's `inferred` annotation from the IR alone. Reads and
//! writes of a variable may widen its type; whenever any widening changes a
//! stored type, the whole pass reruns. Widening is monotone within the
//! finite lattice, so the fixed point is reached in a bounded number of
//! passes.

use std::sync::Arc;

use crate::{
    error::CompileError,
    function::FunctionImpl,
    kind::{ExprType, Kind},
    node::{Expr, Node},
};

/// Runs inference over every function of a compilation unit until no
/// annotation changes.
pub(crate) fn infer_unit(unit: &[Arc<FunctionImpl>]) -> Result<(), CompileError> {
    loop {
        let mut changed = false;
        for func in unit {
            changed |= infer_function(func)?;
        }
        if !changed {
            return Ok(());
        }
    }
}

fn infer_function(func: &FunctionImpl) -> Result<bool, CompileError> {
    let mut changed = false;
    let body_type = infer_node(func, &func.body, &mut changed)?;
    changed |= func.inferred_return.widen(body_type);
    Ok(changed)
}

/// A condition must be a boolean, or a reference that will be checked at
/// runtime.
fn check_condition(t: ExprType) -> Result<(), CompileError> {
    match t.kind() {
        Some(k) if k != Kind::Bool && k != Kind::Ref => Err(CompileError::BadConditionType(k)),
        _ => Ok(()),
    }
}

fn infer_node(func: &FunctionImpl, node: &Node, changed: &mut bool) -> Result<ExprType, CompileError> {
    let t = match &node.expr {
        Expr::Const(v) => ExprType::Known(v.kind()),
        Expr::GetVar(var) => var.inferred.get(),
        Expr::SetVar { var, value } => {
            let value_type = infer_node(func, value, changed)?;
            *changed |= var.inferred.widen(value_type);
            value_type
        }
        Expr::Let { var, init, body } => {
            let init_type = infer_node(func, init, changed)?;
            *changed |= var.inferred.widen(init_type);
            infer_node(func, body, changed)?
        }
        Expr::If { cond, then, alt, .. } => {
            check_condition(infer_node(func, cond, changed)?)?;
            let then_type = infer_node(func, then, changed)?;
            let alt_type = infer_node(func, alt, changed)?;
            then_type.union(alt_type)
        }
        Expr::While { cond, body } => {
            check_condition(infer_node(func, cond, changed)?)?;
            infer_node(func, body, changed)?
        }
        Expr::Block(exprs) => {
            let mut t = ExprType::Known(Kind::Ref);
            for e in exprs {
                t = infer_node(func, e, changed)?;
            }
            t
        }
        Expr::Return(value) => {
            let value_type = infer_node(func, value, changed)?;
            *changed |= func.inferred_return.widen(value_type);
            ExprType::Known(Kind::Void)
        }
        Expr::Call { callee, args, .. } => {
            infer_node(func, callee, changed)?;
            for a in args {
                infer_node(func, a, changed)?;
            }
            ExprType::Unknown
        }
        Expr::Prim1 { op, arg } => {
            let arg_type = infer_node(func, arg, changed)?;
            op.infer(&[arg_type])
        }
        Expr::Prim2 { op, lhs, rhs } => {
            let lhs_type = infer_node(func, lhs, changed)?;
            let rhs_type = infer_node(func, rhs, changed)?;
            op.infer(&[lhs_type, rhs_type])
        }
        Expr::Closure(_) | Expr::FreeFunctionRef(_) => ExprType::Known(Kind::Ref),
        Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
    };
    node.inferred.set(t);
    Ok(t)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{ast, function::registry, prepare};

    fn function_of(params: &[ast::Var], body: Node) -> Vec<Arc<FunctionImpl>> {
        let id = registry::reserve();
        let mut protos = prepare::translate(
            "test",
            id,
            params.iter().map(|v| Arc::clone(&v.0)).collect(),
            body,
        );
        prepare::analyze(&mut protos).unwrap();
        crate::library::freeze(protos)
    }

    #[test]
    fn constants_infer_their_literal_kind() {
        let unit = function_of(&[], ast::int(42));
        infer_unit(&unit).unwrap();
        assert_eq!(unit[0].body.inferred.get(), ExprType::Known(Kind::Int));
        assert_eq!(unit[0].inferred_return.get(), ExprType::Known(Kind::Int));
    }

    #[test]
    fn branches_join_pessimistically() {
        let x = ast::var("x");
        let unit = function_of(&[x.clone()], ast::if_(ast::get(&x), ast::int(1), ast::str_("s")));
        infer_unit(&unit).unwrap();
        assert_eq!(unit[0].body.inferred.get(), ExprType::Known(Kind::Ref));
    }

    #[test]
    fn let_widens_the_variable() {
        let t = ast::local("t");
        let unit = function_of(
            &[],
            ast::let_(
                &t,
                ast::int(1),
                ast::block(vec![ast::set(&t, ast::str_("s")), ast::get(&t)]),
            ),
        );
        infer_unit(&unit).unwrap();
        assert_eq!(t.0.inferred.get(), ExprType::Known(Kind::Ref));
    }

    #[test]
    fn call_results_are_unknown_and_absorb() {
        let mut lib = crate::Library::new();
        let t = ast::local("t");
        let callee = lib.self_ref("self-calling");
        let body = ast::if_(
            ast::bool_(true),
            ast::int(0),
            ast::let_(&t, ast::call(callee, vec![]), ast::get(&t)),
        );
        let func = lib.define("self-calling", ast::lambda(&[], body)).unwrap();
        let unit = vec![crate::function::registry::get(func.id())];
        infer_unit(&unit).unwrap();
        assert_eq!(t.0.inferred.get(), ExprType::Unknown);
        assert_eq!(unit[0].body.inferred.get(), ExprType::Unknown);
    }

    #[test]
    fn inference_is_idempotent_at_the_fixed_point() {
        let x = ast::var("x");
        let t = ast::local("t");
        let unit = function_of(
            &[x.clone()],
            ast::let_(&t, ast::prim2(crate::Primitive::Add, ast::get(&x), ast::int(1)), ast::get(&t)),
        );
        infer_unit(&unit).unwrap();
        let before = (t.0.inferred.get(), unit[0].inferred_return.get());
        infer_unit(&unit).unwrap();
        assert_eq!(before, (t.0.inferred.get(), unit[0].inferred_return.get()));
        assert_eq!(t.0.inferred.get(), ExprType::Known(Kind::Int));
    }

    #[test]
    fn non_boolean_conditions_are_compile_errors() {
        let unit = function_of(&[], ast::if_(ast::int(1), ast::int(2), ast::int(3)));
        assert_eq!(infer_unit(&unit).unwrap_err(), CompileError::BadConditionType(Kind::Int));
    }
}
