//! Profile-driven observed-type computation.
//!
//! Mirrors the inferencer's traversal, but over the `observed` annotations,
//! and joins opportunistically: a branch whose counter is zero contributes
//! nothing, so code that never ran cannot forbid specialization. Kind
//! observations enter only through recorded profiles — call-site profiles,
//! variable read profiles, and function entry profiles. A constant or
//! primitive only claims its static kind when the surrounding code actually
//! executed.

use crate::{
    function::FunctionImpl,
    kind::{ExprType, Kind},
    node::{Expr, Node},
};

/// Computes observed types for one function from its recorded profiles.
///
/// Requires profiles, so it runs during compilation, after enough profiled
/// entries.
pub(crate) fn observe_function(func: &FunctionImpl) {
    // Parameters are observed at function entry, copied variables at their
    // reads.
    for (i, param) in func.params.iter().enumerate() {
        param.observed.set(func.profile.param(i).observed_kind());
    }
    for copied in &func.synthetic {
        copied.observed.set(copied.profile.observed_kind());
    }
    let reached = func.profile.invocations() > 0;
    let body_type = observe_node(func, &func.body, reached);
    func.observed_return.widen_opportunistic(body_type);
}

fn observe_node(func: &FunctionImpl, node: &Node, reached: bool) -> ExprType {
    let t = match &node.expr {
        Expr::Const(v) => {
            if reached {
                ExprType::Known(v.kind())
            } else {
                ExprType::Unknown
            }
        }
        Expr::GetVar(var) => var.profile.observed_kind(),
        Expr::SetVar { value, .. } => observe_node(func, value, reached),
        Expr::Let { var, init, body } => {
            observe_node(func, init, reached);
            var.observed.set(var.profile.observed_kind());
            observe_node(func, body, reached)
        }
        Expr::If {
            cond,
            then,
            alt,
            true_count,
            false_count,
        } => {
            observe_node(func, cond, reached);
            let then_reached = reached && true_count.get() > 0;
            let alt_reached = reached && false_count.get() > 0;
            let then_type = observe_node(func, then, then_reached);
            let alt_type = observe_node(func, alt, alt_reached);
            match (then_reached, alt_reached) {
                (true, true) => then_type.opportunistic_union(alt_type),
                (true, false) => then_type,
                (false, true) => alt_type,
                (false, false) => ExprType::Unknown,
            }
        }
        Expr::While { cond, body } => {
            observe_node(func, cond, reached);
            observe_node(func, body, reached)
        }
        Expr::Block(exprs) => {
            let mut t = if reached {
                ExprType::Known(Kind::Ref)
            } else {
                ExprType::Unknown
            };
            for e in exprs {
                t = observe_node(func, e, reached);
            }
            t
        }
        Expr::Return(value) => {
            let value_type = observe_node(func, value, reached);
            func.observed_return.widen_opportunistic(value_type);
            if reached {
                ExprType::Known(Kind::Void)
            } else {
                ExprType::Unknown
            }
        }
        Expr::Call { callee, args, profile } => {
            observe_node(func, callee, reached);
            for a in args {
                observe_node(func, a, reached);
            }
            profile.observed_kind()
        }
        Expr::Prim1 { op, arg } => {
            let arg_type = observe_node(func, arg, reached);
            if reached {
                op.infer(&[arg_type])
            } else {
                ExprType::Unknown
            }
        }
        Expr::Prim2 { op, lhs, rhs } => {
            let lhs_type = observe_node(func, lhs, reached);
            let rhs_type = observe_node(func, rhs, reached);
            if reached {
                op.infer(&[lhs_type, rhs_type])
            } else {
                ExprType::Unknown
            }
        }
        Expr::Closure(_) | Expr::FreeFunctionRef(_) => {
            if reached {
                ExprType::Known(Kind::Ref)
            } else {
                ExprType::Unknown
            }
        }
        Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
    };
    node.observed.set(t);
    t
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{ast, function::registry, prepare, value::Value};

    fn function_of(params: &[ast::Var], body: crate::node::Node) -> Arc<FunctionImpl> {
        let id = registry::reserve();
        let mut protos = prepare::translate(
            "test",
            id,
            params.iter().map(|v| Arc::clone(&v.0)).collect(),
            body,
        );
        prepare::analyze(&mut protos).unwrap();
        crate::library::freeze(protos).remove(0)
    }

    #[test]
    fn unexecuted_functions_observe_nothing() {
        let func = function_of(&[], ast::int(42));
        observe_function(&func);
        assert_eq!(func.body.observed.get(), ExprType::Unknown);
        assert_eq!(func.observed_return.get(), ExprType::Unknown);
    }

    #[test]
    fn executed_constants_observe_their_kind() {
        let func = function_of(&[], ast::int(42));
        func.profile.record_call(&[]);
        observe_function(&func);
        assert_eq!(func.body.observed.get(), ExprType::Known(Kind::Int));
        assert_eq!(func.observed_return.get(), ExprType::Known(Kind::Int));
    }

    #[test]
    fn untaken_branches_do_not_pollute_the_if() {
        let x = ast::var("x");
        let func = function_of(&[x.clone()], ast::if_(ast::get(&x), ast::int(1), ast::str_("false")));
        func.profile.record_call(&[Value::Bool(true)]);
        let Expr::If { true_count, .. } = &func.body.expr else {
            panic!("expected if");
        };
        true_count.bump();
        observe_function(&func);
        // Only the taken branch contributes: the if observes int, not ref.
        assert_eq!(func.body.observed.get(), ExprType::Known(Kind::Int));
        assert_eq!(func.observed_return.get(), ExprType::Known(Kind::Int));
        assert_eq!(func.params[0].observed.get(), ExprType::Known(Kind::Bool));
    }

    #[test]
    fn both_branches_join_opportunistically() {
        let x = ast::var("x");
        let func = function_of(&[x.clone()], ast::if_(ast::get(&x), ast::int(1), ast::str_("false")));
        func.profile.record_call(&[Value::Bool(true)]);
        func.profile.record_call(&[Value::Bool(false)]);
        let Expr::If {
            true_count,
            false_count,
            ..
        } = &func.body.expr
        else {
            panic!("expected if");
        };
        true_count.bump();
        false_count.bump();
        observe_function(&func);
        assert_eq!(func.body.observed.get(), ExprType::Known(Kind::Ref));
    }
}
